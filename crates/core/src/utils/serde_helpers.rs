//! Serde helpers for policy enums written by hand in config files

/// Implement case-insensitive deserialization for a fieldless enum, with any
/// number of accepted spellings per variant. The first spelling is the one
/// listed in error messages.
///
/// Usage:
/// ```ignore
/// impl_case_insensitive_deserialize!(
///     Policy,
///     Keep => ["keep", "no-overwrite"],
///     Replace => ["replace"],
/// );
/// ```
#[macro_export]
macro_rules! impl_case_insensitive_deserialize {
    ($enum_type:ty, $($variant:ident => [$($spelling:expr),+]),+ $(,)?) => {
        impl<'de> serde::Deserialize<'de> for $enum_type {
            fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                let lowered = s.trim().to_lowercase();
                $(
                    if [$($spelling),+].contains(&lowered.as_str()) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(serde::de::Error::custom(format!(
                    "unknown variant '{}', expected one of: {}",
                    s,
                    [$([$($spelling),+][0]),+].join(", ")
                )))
            }
        }
    };
}
