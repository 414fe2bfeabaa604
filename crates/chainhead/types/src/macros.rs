/// Generates the usual conversions and accessors for a newtype wrapping a
/// [`String`].
///
/// This must be a newtype a la `struct Foo(String);`.
macro_rules! impl_string_wrapper {
    ($target:ident) => {
        impl $target {
            pub fn new(v: impl Into<String>) -> Self {
                Self(v.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $target {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $target {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<$target> for String {
            fn from(value: $target) -> String {
                value.0
            }
        }

        impl ::std::fmt::Display for $target {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

pub(crate) use impl_string_wrapper;
