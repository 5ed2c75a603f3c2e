/// Declares an opaque string identifier issued by a third party (push tokens, external ids).
///
/// `Debug` only shows a short prefix so the value can sit in spans and log fields without
/// leaking the full identifier.
#[macro_export]
macro_rules! string_key {
    ($TypeName: ident) => {
        #[derive(
            Clone, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $TypeName(String);

        impl $TypeName {
            pub fn new(value: impl Into<String>) -> Self {
                $TypeName(value.into())
            }

            pub fn inner(&self) -> String {
                self.0.clone()
            }

            pub fn redacted(&self) -> String {
                let prefix: String = self.0.chars().take(8).collect();
                format!("{prefix}…")
            }
        }

        impl std::fmt::Debug for $TypeName {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($TypeName), self.redacted())
            }
        }

        impl std::fmt::Display for $TypeName {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $TypeName {
            fn from(id: String) -> Self {
                $TypeName(id)
            }
        }

        impl From<&str> for $TypeName {
            fn from(id: &str) -> Self {
                $TypeName(id.to_owned())
            }
        }

        impl AsRef<str> for $TypeName {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}
