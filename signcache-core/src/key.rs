//! Cache key derivation.
//!
//! Keys have the shape
//! `<prefix>:<version_tag>:[<qualified_name>:]<static_name | argument suffix>`.
//!
//! - With a static name the function name and arguments are left out, so
//!   every call shares one entry.
//! - Otherwise the lower-cased qualified name is followed by a suffix built
//!   from the call arguments. Keyword arguments are sorted by name first, so
//!   the order in which they were supplied never changes the key.
//! - A qualified name containing a `.` (`Type.method`) denotes a bound
//!   method; its first positional argument is the receiver and is skipped.
//!
//! The version tag separates entries written by incompatible codec versions.

use std::fmt;

use crate::args::{ArgKind, CallArgs, Signature};

/// Separator between key segments.
pub const KEY_SEPARATOR: &str = ":";

/// Whether a qualified name denotes a bound method (`Type.method`).
pub fn is_bound_method(qualified_name: &str) -> bool {
    qualified_name.contains('.')
}

/// Keyword names are written bare when they are plain identifiers and
/// quoted otherwise, so a name can never smuggle in a separator or `=`.
fn keyword_name(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("{name:?}")
    }
}

/// Build the argument part of a key.
///
/// Positional fragments come first in call order, then `name=value` keyword
/// pairs sorted by name. Returns an empty string when there is nothing left
/// after skipping the receiver.
///
/// Fragments of key-safe kinds never contain a bare `=` (strings are quoted),
/// so a keyword pair cannot be mistaken for a positional value.
pub fn argument_suffix(
    positional: &[String],
    keywords: &[(String, String)],
    skip_receiver: bool,
) -> String {
    let positional = if skip_receiver {
        positional.get(1..).unwrap_or_default()
    } else {
        positional
    };

    let mut sorted: Vec<&(String, String)> = keywords.iter().collect();
    sorted.sort();

    positional
        .iter()
        .cloned()
        .chain(
            sorted
                .into_iter()
                .map(|(name, value)| format!("{}={value}", keyword_name(name))),
        )
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

/// Derive a cache key from its parts.
pub fn derive_key(
    prefix: &str,
    version_tag: &str,
    qualified_name: &str,
    static_name: Option<&str>,
    positional: &[String],
    keywords: &[(String, String)],
) -> String {
    KeyDeriver::new(prefix, version_tag, qualified_name, static_name)
        .key_from_parts(positional, keywords)
}

/// Derives keys for one wrapped computation.
///
/// The fixed part of the key is computed once at construction; only the
/// argument suffix is built per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDeriver {
    /// `prefix:version_tag:qualified_name`, or the full static key.
    base: String,
    is_static: bool,
    skip_receiver: bool,
}

impl KeyDeriver {
    pub fn new(
        prefix: &str,
        version_tag: &str,
        qualified_name: &str,
        static_name: Option<&str>,
    ) -> Self {
        match static_name {
            Some(name) => Self {
                base: format!("{prefix}{KEY_SEPARATOR}{version_tag}{KEY_SEPARATOR}{name}"),
                is_static: true,
                skip_receiver: false,
            },
            None => Self {
                base: format!(
                    "{prefix}{KEY_SEPARATOR}{version_tag}{KEY_SEPARATOR}{}",
                    qualified_name.to_lowercase()
                ),
                is_static: false,
                skip_receiver: is_bound_method(qualified_name),
            },
        }
    }

    /// Whether every call maps to the same key.
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Whether the first positional argument is skipped as a receiver.
    pub fn skips_receiver(&self) -> bool {
        self.skip_receiver
    }

    /// Key for one call.
    pub fn key_for<A: CallArgs>(&self, args: &A) -> String {
        if self.is_static {
            return self.base.clone();
        }
        self.key_from_parts(&args.positional(), &args.keywords())
    }

    /// Key for already rendered argument fragments.
    pub fn key_from_parts(&self, positional: &[String], keywords: &[(String, String)]) -> String {
        if self.is_static {
            return self.base.clone();
        }
        let suffix = argument_suffix(positional, keywords, self.skip_receiver);
        if suffix.is_empty() {
            self.base.clone()
        } else {
            format!("{}{KEY_SEPARATOR}{suffix}", self.base)
        }
    }
}

// ============================================================================
// SAFETY LINT
// ============================================================================

/// A declared parameter whose values may not render to a unique, stable
/// key fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsafeParameter {
    pub name: String,
    /// `None` for undeclared variadic arguments.
    pub kind: Option<ArgKind>,
}

impl fmt::Display for UnsafeParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Some(kind) => write!(f, "parameter `{}` of kind {kind}", self.name),
            None => write!(f, "variadic arguments"),
        }
    }
}

/// Parameters of `signature` that are unsafe for automatic key derivation.
///
/// Advisory only: callers can sidestep any finding with a static name.
pub fn unsafe_parameters(signature: &Signature, skip_receiver: bool) -> Vec<UnsafeParameter> {
    let skip = usize::from(skip_receiver);
    let mut findings: Vec<UnsafeParameter> = signature
        .params()
        .iter()
        .skip(skip)
        .filter(|param| !param.kind.is_key_safe())
        .map(|param| UnsafeParameter {
            name: param.name.clone(),
            kind: Some(param.kind.clone()),
        })
        .collect();

    if signature.is_variadic() {
        findings.push(UnsafeParameter {
            name: "*args".to_string(),
            kind: None,
        });
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{Args, Opaque};
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_static_name_ignores_arguments() {
        let deriver = KeyDeriver::new("app", "0.4", "lookup", Some("location_codes"));
        assert!(deriver.is_static());
        assert_eq!(deriver.key_for(&(1i64,)), "app:0.4:location_codes");
        assert_eq!(deriver.key_for(&(2i64,)), "app:0.4:location_codes");
    }

    #[test]
    fn test_no_arguments_uses_lowercased_name() {
        let key = derive_key("app", "0.4", "FetchPorts", None, &[], &[]);
        assert_eq!(key, "app:0.4:fetchports");
    }

    #[test]
    fn test_positional_then_sorted_keywords() {
        let key = derive_key(
            "app",
            "0.4",
            "f",
            None,
            &strings(&["3", "11"]),
            &pairs(&[("d", "1"), ("c", "15")]),
        );
        assert_eq!(key, "app:0.4:f:3:11:c=15:d=1");
    }

    #[test]
    fn test_separators_inside_strings_do_not_collide() {
        let deriver = KeyDeriver::new("p", "1.0", "join", None);
        let left = deriver.key_for(&("a:b".to_string(), "c".to_string()));
        let right = deriver.key_for(&("a".to_string(), "b:c".to_string()));
        assert_ne!(left, right);
        assert_eq!(left, "p:1.0:join:\"a:b\":\"c\"");
    }

    #[test]
    fn test_positional_string_differs_from_keyword() {
        let deriver = KeyDeriver::new("p", "1.0", "f", None);
        let positional = deriver.key_for(&Args::new().arg("c=15"));
        let keyword = deriver.key_for(&Args::new().kwarg("c", 15));
        assert_ne!(positional, keyword);
        assert_eq!(keyword, "p:1.0:f:c=15");
    }

    #[test]
    fn test_odd_keyword_names_are_quoted() {
        let deriver = KeyDeriver::new("p", "1.0", "f", None);
        let odd = deriver.key_for(&Args::new().kwarg("a=1:b", 2));
        let plain = deriver.key_for(&Args::new().kwarg("a", 1).kwarg("b", 2));
        assert_ne!(odd, plain);
        assert_eq!(odd, "p:1.0:f:\"a=1:b\"=2");
    }

    #[test]
    fn test_absent_optional_does_not_collide_with_text() {
        let deriver = KeyDeriver::new("p", "1.0", "f", None);
        assert_ne!(
            deriver.key_for(&(Some("None".to_string()),)),
            deriver.key_for(&(Option::<String>::None,))
        );
    }

    #[test]
    fn test_bound_method_skips_receiver() {
        let deriver = KeyDeriver::new("app", "0.4", "Inventory.lookup", None);
        assert!(deriver.skips_receiver());
        let key = deriver.key_for(&(Opaque("pool"), 42u32));
        assert_eq!(key, "app:0.4:inventory.lookup:42");
    }

    #[test]
    fn test_path_qualified_function_is_not_a_method() {
        assert!(!is_bound_method("inventory::lookup"));
        assert!(is_bound_method("Inventory.lookup"));
    }

    #[test]
    fn test_receiver_only_call_has_no_suffix() {
        let deriver = KeyDeriver::new("app", "0.4", "Client.ping", None);
        assert_eq!(deriver.key_for(&(Opaque(1u8),)), "app:0.4:client.ping");
    }

    #[test]
    fn test_lint_accepts_safe_signature() {
        let signature = <(i64, String, Option<uuid::Uuid>) as CallArgs>::signature();
        assert!(unsafe_parameters(&signature, false).is_empty());
    }

    #[test]
    fn test_lint_reports_collections_and_opaque() {
        let signature = <(i64, Vec<i64>, HashMap<String, i64>) as CallArgs>::signature();
        let findings = unsafe_parameters(&signature, false);
        let names: Vec<_> = findings.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["arg1", "arg2"]);
        assert_eq!(findings[0].kind, Some(ArgKind::Sequence));
    }

    #[test]
    fn test_lint_skips_receiver() {
        let signature = <(Opaque<&str>, u32) as CallArgs>::signature();
        assert_eq!(unsafe_parameters(&signature, false).len(), 1);
        assert!(unsafe_parameters(&signature, true).is_empty());
    }

    #[test]
    fn test_lint_reports_variadic() {
        let findings = unsafe_parameters(&<Args as CallArgs>::signature(), false);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, None);
        assert_eq!(findings[0].to_string(), "variadic arguments");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_key_is_deterministic(
            positional in prop::collection::vec("[a-z0-9]{0,8}", 0..5),
            keywords in prop::collection::vec(("[a-z]{1,4}", "[0-9]{1,4}"), 0..5),
        ) {
            let first = derive_key("p", "1.0", "f", None, &positional, &keywords);
            let second = derive_key("p", "1.0", "f", None, &positional, &keywords);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_keyword_order_is_irrelevant(
            keywords in prop::collection::btree_map("[a-z]{1,6}", "[0-9]{1,6}", 0..6),
        ) {
            let forward: Vec<(String, String)> = keywords.clone().into_iter().collect();
            let mut backward = forward.clone();
            backward.reverse();

            let positional = vec!["x".to_string()];
            prop_assert_eq!(
                derive_key("p", "1.0", "f", None, &positional, &forward),
                derive_key("p", "1.0", "f", None, &positional, &backward)
            );
        }

        #[test]
        fn prop_distinct_string_pairs_get_distinct_keys(
            a in "[a-z:=,\"]{0,6}",
            b in "[a-z:=,\"]{0,6}",
            c in "[a-z:=,\"]{0,6}",
            d in "[a-z:=,\"]{0,6}",
        ) {
            prop_assume!((&a, &b) != (&c, &d));
            let deriver = KeyDeriver::new("p", "1.0", "f", None);
            prop_assert_ne!(
                deriver.key_for(&(a.clone(), b.clone())),
                deriver.key_for(&(c.clone(), d.clone()))
            );
        }

        #[test]
        fn prop_static_key_collides_for_all_arguments(a in any::<i64>(), b in any::<i64>()) {
            let deriver = KeyDeriver::new("p", "1.0", "f", Some("shared"));
            prop_assert_eq!(deriver.key_for(&(a,)), deriver.key_for(&(b,)));
        }
    }
}
