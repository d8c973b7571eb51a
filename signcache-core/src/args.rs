//! Call arguments as cache key material.
//!
//! A wrapped computation takes a single argument value implementing
//! [`CallArgs`]. That value knows how to render itself into positional and
//! keyword key fragments, and declares a [`Signature`] that is linted once
//! when the computation is wrapped.
//!
//! Fragments are plain text. Types whose text form is not unique or not
//! stable (collections, hash-ordered sets, `Debug` output of arbitrary
//! structs) still work, but are reported as unsafe for automatic keys.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Coarse classification of an argument type for the key safety lint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Integer,
    String,
    Float,
    Timestamp,
    Uuid,
    Boolean,
    Sequence,
    Set,
    Mapping,
    /// Anything rendered through `Debug`.
    Opaque,
    Optional(Box<ArgKind>),
}

impl ArgKind {
    /// Whether values of this kind render to a unique, stable key fragment.
    ///
    /// The safe set is integers, strings, floats, timestamps and UUIDs, plus
    /// optional wrappers of those.
    pub fn is_key_safe(&self) -> bool {
        match self {
            ArgKind::Integer
            | ArgKind::String
            | ArgKind::Float
            | ArgKind::Timestamp
            | ArgKind::Uuid => true,
            ArgKind::Optional(inner) => inner.is_key_safe(),
            ArgKind::Boolean
            | ArgKind::Sequence
            | ArgKind::Set
            | ArgKind::Mapping
            | ArgKind::Opaque => false,
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::Integer => write!(f, "integer"),
            ArgKind::String => write!(f, "string"),
            ArgKind::Float => write!(f, "float"),
            ArgKind::Timestamp => write!(f, "timestamp"),
            ArgKind::Uuid => write!(f, "uuid"),
            ArgKind::Boolean => write!(f, "boolean"),
            ArgKind::Sequence => write!(f, "sequence"),
            ArgKind::Set => write!(f, "set"),
            ArgKind::Mapping => write!(f, "mapping"),
            ArgKind::Opaque => write!(f, "opaque"),
            ArgKind::Optional(inner) => write!(f, "optional {inner}"),
        }
    }
}

/// A single argument value usable in an automatically derived cache key.
pub trait KeyArg {
    /// Kind reported to the safety lint.
    fn kind() -> ArgKind;

    /// Text written into the key for this value.
    fn key_fragment(&self) -> String;
}

macro_rules! impl_key_arg_display {
    ($kind:expr => $($ty:ty),+ $(,)?) => {
        $(
            impl KeyArg for $ty {
                fn kind() -> ArgKind {
                    $kind
                }

                fn key_fragment(&self) -> String {
                    self.to_string()
                }
            }
        )+
    };
}

impl_key_arg_display!(ArgKind::Integer => i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
impl_key_arg_display!(ArgKind::Boolean => bool);
impl_key_arg_display!(ArgKind::Uuid => Uuid);
impl_key_arg_display!(ArgKind::Timestamp => NaiveDate);

// Quoted and escaped, so separators inside a value never split it and
// `"None"` stays distinct from an absent optional.
macro_rules! impl_key_arg_quoted {
    ($kind:expr => $($ty:ty),+ $(,)?) => {
        $(
            impl KeyArg for $ty {
                fn kind() -> ArgKind {
                    $kind
                }

                fn key_fragment(&self) -> String {
                    format!("{self:?}")
                }
            }
        )+
    };
}

impl_key_arg_quoted!(ArgKind::String => String, str, char);

// `Debug` keeps the trailing `.0`, so `1.0` and `1` never collide.
impl KeyArg for f32 {
    fn kind() -> ArgKind {
        ArgKind::Float
    }

    fn key_fragment(&self) -> String {
        format!("{self:?}")
    }
}

impl KeyArg for f64 {
    fn kind() -> ArgKind {
        ArgKind::Float
    }

    fn key_fragment(&self) -> String {
        format!("{self:?}")
    }
}

impl KeyArg for DateTime<Utc> {
    fn kind() -> ArgKind {
        ArgKind::Timestamp
    }

    fn key_fragment(&self) -> String {
        self.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

impl KeyArg for NaiveDateTime {
    fn kind() -> ArgKind {
        ArgKind::Timestamp
    }

    fn key_fragment(&self) -> String {
        self.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
    }
}

impl<T: KeyArg + ?Sized> KeyArg for &T {
    fn kind() -> ArgKind {
        T::kind()
    }

    fn key_fragment(&self) -> String {
        (**self).key_fragment()
    }
}

impl<T: KeyArg> KeyArg for Option<T> {
    fn kind() -> ArgKind {
        ArgKind::Optional(Box::new(T::kind()))
    }

    fn key_fragment(&self) -> String {
        match self {
            // Nested optionals keep their `Some`, so `Some(None)` is not `None`.
            Some(value) if matches!(T::kind(), ArgKind::Optional(_)) => {
                format!("Some({})", value.key_fragment())
            }
            Some(value) => value.key_fragment(),
            None => "None".to_string(),
        }
    }
}

fn join_fragments<'a, T: KeyArg + 'a>(items: impl Iterator<Item = &'a T>) -> String {
    items.map(KeyArg::key_fragment).collect::<Vec<_>>().join(",")
}

fn join_pairs<'a, K: KeyArg + 'a, V: KeyArg + 'a>(items: impl Iterator<Item = (&'a K, &'a V)>) -> String {
    items
        .map(|(k, v)| format!("{}={}", k.key_fragment(), v.key_fragment()))
        .collect::<Vec<_>>()
        .join(",")
}

impl<T: KeyArg> KeyArg for [T] {
    fn kind() -> ArgKind {
        ArgKind::Sequence
    }

    fn key_fragment(&self) -> String {
        format!("[{}]", join_fragments(self.iter()))
    }
}

impl<T: KeyArg> KeyArg for Vec<T> {
    fn kind() -> ArgKind {
        ArgKind::Sequence
    }

    fn key_fragment(&self) -> String {
        self.as_slice().key_fragment()
    }
}

// Hash-ordered collections render in iteration order, which differs between
// processes. The lint reports them; they are deliberately not sorted here.
impl<T: KeyArg, S> KeyArg for HashSet<T, S> {
    fn kind() -> ArgKind {
        ArgKind::Set
    }

    fn key_fragment(&self) -> String {
        format!("{{{}}}", join_fragments(self.iter()))
    }
}

impl<T: KeyArg> KeyArg for BTreeSet<T> {
    fn kind() -> ArgKind {
        ArgKind::Set
    }

    fn key_fragment(&self) -> String {
        format!("{{{}}}", join_fragments(self.iter()))
    }
}

impl<K: KeyArg, V: KeyArg, S> KeyArg for HashMap<K, V, S> {
    fn kind() -> ArgKind {
        ArgKind::Mapping
    }

    fn key_fragment(&self) -> String {
        format!("{{{}}}", join_pairs(self.iter()))
    }
}

impl<K: KeyArg, V: KeyArg> KeyArg for BTreeMap<K, V> {
    fn kind() -> ArgKind {
        ArgKind::Mapping
    }

    fn key_fragment(&self) -> String {
        format!("{{{}}}", join_pairs(self.iter()))
    }
}

/// Wrapper rendering any `Debug` value into a key fragment.
///
/// Also the usual way to pass a receiver as the first argument of a bound
/// method, where it is skipped anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opaque<T>(pub T);

impl<T: fmt::Debug> KeyArg for Opaque<T> {
    fn kind() -> ArgKind {
        ArgKind::Opaque
    }

    fn key_fragment(&self) -> String {
        format!("{:?}", self.0)
    }
}

// ============================================================================
// SIGNATURES
// ============================================================================

/// A declared parameter of a wrapped computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ArgKind,
}

/// Declared parameter list of a wrapped computation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<Param>,
    variadic: bool,
}

impl Signature {
    /// An empty signature.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter of an explicit kind.
    pub fn param(mut self, name: impl Into<String>, kind: ArgKind) -> Self {
        self.params.push(Param {
            name: name.into(),
            kind,
        });
        self
    }

    /// Append a parameter whose kind comes from its Rust type.
    pub fn param_of<T: KeyArg + ?Sized>(self, name: impl Into<String>) -> Self {
        self.param(name, T::kind())
    }

    /// Mark the signature as accepting arbitrary extra arguments.
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Declared parameters, in order.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Whether arguments beyond the declared ones are accepted.
    pub fn is_variadic(&self) -> bool {
        self.variadic
    }
}

// ============================================================================
// CALL ARGUMENTS
// ============================================================================

/// The complete argument list of one call to a wrapped computation.
///
/// # Implementation Requirements
///
/// - `positional()` and `keywords()` must be pure: equal arguments must
///   always produce equal fragments
/// - `signature()` must describe every value that may show up in the
///   fragments, in positional order
pub trait CallArgs: Send + Sync {
    /// Positional argument fragments, in call order.
    fn positional(&self) -> Vec<String>;

    /// Keyword argument fragments. Order is irrelevant to the derived key.
    fn keywords(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Declared parameters, inspected once at wrap time.
    fn signature() -> Signature
    where
        Self: Sized;
}

impl CallArgs for () {
    fn positional(&self) -> Vec<String> {
        Vec::new()
    }

    fn signature() -> Signature {
        Signature::new()
    }
}

macro_rules! impl_call_args_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: KeyArg + Send + Sync),+> CallArgs for ($($name,)+) {
            fn positional(&self) -> Vec<String> {
                vec![$(self.$idx.key_fragment()),+]
            }

            fn signature() -> Signature {
                Signature::new()$(.param_of::<$name>(concat!("arg", stringify!($idx))))+
            }
        }
    };
}

impl_call_args_tuple!(A: 0);
impl_call_args_tuple!(A: 0, B: 1);
impl_call_args_tuple!(A: 0, B: 1, C: 2);
impl_call_args_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_call_args_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_call_args_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_call_args_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_call_args_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

/// Dynamically assembled positional and keyword arguments.
///
/// Values are rendered when added, so the wrapped computation reads them
/// back as fragments. Its signature is variadic, which the lint reports.
///
/// ```ignore
/// let args = Args::new().arg(3).arg(11).kwarg("c", 15);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    positional: Vec<String>,
    keywords: Vec<(String, String)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg<T: KeyArg>(mut self, value: T) -> Self {
        self.positional.push(value.key_fragment());
        self
    }

    /// Add a keyword argument.
    pub fn kwarg<T: KeyArg>(mut self, name: impl Into<String>, value: T) -> Self {
        self.keywords.push((name.into(), value.key_fragment()));
        self
    }

    /// Fragment of the positional argument at `index`.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    /// Fragment of the keyword argument `name`.
    pub fn get_kwarg(&self, name: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

impl CallArgs for Args {
    fn positional(&self) -> Vec<String> {
        self.positional.clone()
    }

    fn keywords(&self) -> Vec<(String, String)> {
        self.keywords.clone()
    }

    fn signature() -> Signature {
        Signature::new().variadic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_safe_kinds() {
        assert!(ArgKind::Integer.is_key_safe());
        assert!(ArgKind::Uuid.is_key_safe());
        assert!(ArgKind::Optional(Box::new(ArgKind::Timestamp)).is_key_safe());
        assert!(!ArgKind::Optional(Box::new(ArgKind::Sequence)).is_key_safe());
        assert!(!ArgKind::Mapping.is_key_safe());
        assert!(!ArgKind::Opaque.is_key_safe());
    }

    #[test]
    fn test_kind_of_common_types() {
        assert_eq!(<u16 as KeyArg>::kind(), ArgKind::Integer);
        assert_eq!(<&str as KeyArg>::kind(), ArgKind::String);
        assert_eq!(<Vec<i32> as KeyArg>::kind(), ArgKind::Sequence);
        assert_eq!(
            <Option<Uuid> as KeyArg>::kind(),
            ArgKind::Optional(Box::new(ArgKind::Uuid))
        );
        assert_eq!(<HashMap<String, i32> as KeyArg>::kind(), ArgKind::Mapping);
    }

    #[test]
    fn test_fragments() {
        assert_eq!(42u32.key_fragment(), "42");
        assert_eq!("ASD001A".key_fragment(), "\"ASD001A\"");
        assert_eq!('x'.key_fragment(), "'x'");
        assert_eq!(1.0f64.key_fragment(), "1.0");
        assert_eq!(Option::<i32>::None.key_fragment(), "None");
        assert_eq!(Some(7i32).key_fragment(), "7");
        assert_eq!(vec![1i32, 2, 3].key_fragment(), "[1,2,3]");
        assert_eq!(Uuid::nil().key_fragment(), "00000000-0000-0000-0000-000000000000");

        let ts = Utc.with_ymd_and_hms(2019, 4, 1, 12, 0, 0).unwrap();
        assert_eq!(ts.key_fragment(), "2019-04-01T12:00:00Z");

        let mut map = BTreeMap::new();
        map.insert("b", 2i32);
        map.insert("a", 1i32);
        assert_eq!(map.key_fragment(), "{\"a\"=1,\"b\"=2}");
    }

    #[test]
    fn test_string_fragments_are_escaped() {
        assert_eq!("a:b".key_fragment(), "\"a:b\"");
        assert_eq!("say \"hi\"".key_fragment(), "\"say \\\"hi\\\"\"");
        assert_ne!(
            vec!["a,b".to_string()].key_fragment(),
            vec!["a".to_string(), "b".to_string()].key_fragment()
        );
    }

    #[test]
    fn test_absent_optional_differs_from_every_present_value() {
        assert_ne!(Some("None".to_string()).key_fragment(), Option::<String>::None.key_fragment());
        assert_ne!(Some(Option::<i32>::None).key_fragment(), Option::<Option<i32>>::None.key_fragment());
        assert_eq!(Some(Some(3i32)).key_fragment(), "Some(3)");
    }

    #[test]
    fn test_opaque_uses_debug() {
        #[derive(Debug)]
        struct Client {
            #[allow(dead_code)]
            host: &'static str,
        }
        let fragment = Opaque(Client { host: "db" }).key_fragment();
        assert_eq!(fragment, "Client { host: \"db\" }");
    }

    #[test]
    fn test_tuple_call_args() {
        let args = (7i64, "eth0".to_string(), Some(1.5f64));
        assert_eq!(args.positional(), vec!["7", "\"eth0\"", "1.5"]);
        assert!(args.keywords().is_empty());

        let signature = <(i64, String, Option<f64>) as CallArgs>::signature();
        let names: Vec<_> = signature.params().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["arg0", "arg1", "arg2"]);
        assert!(!signature.is_variadic());
    }

    #[test]
    fn test_dynamic_args() {
        let args = Args::new().arg(3).arg(11).kwarg("c", 15);
        assert_eq!(args.get(0), Some("3"));
        assert_eq!(args.get_kwarg("c"), Some("15"));
        assert_eq!(args.get_kwarg("d"), None);
        assert!(<Args as CallArgs>::signature().is_variadic());
    }
}
