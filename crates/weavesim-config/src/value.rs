//! Conversions from a raw [`toml::Value`] leaf into the scalar types
//! `Config::get` is asked for — the Rust analogue of the original's
//! `config.get<uint32_t>(...)`/`config.get<const char*>(...)` template
//! instantiations.

use crate::error::ConfigError;

pub trait FromConfigValue: Sized {
    const EXPECTED: &'static str;
    fn from_value(value: &toml::Value) -> Option<Self>;
}

impl FromConfigValue for bool {
    const EXPECTED: &'static str = "bool";
    fn from_value(value: &toml::Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromConfigValue for String {
    const EXPECTED: &'static str = "string";
    fn from_value(value: &toml::Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

macro_rules! int_from_config_value {
    ($($ty:ty),+) => {
        $(
            impl FromConfigValue for $ty {
                const EXPECTED: &'static str = stringify!($ty);
                fn from_value(value: &toml::Value) -> Option<Self> {
                    value.as_integer().and_then(|i| <$ty>::try_from(i).ok())
                }
            }
        )+
    };
}

int_from_config_value!(u8, u16, u32, u64, i8, i16, i32, i64);

impl FromConfigValue for f64 {
    const EXPECTED: &'static str = "f64";
    fn from_value(value: &toml::Value) -> Option<Self> {
        value.as_float().or_else(|| value.as_integer().map(|i| i as f64))
    }
}

pub(crate) fn coerce<T: FromConfigValue>(path: &str, value: &toml::Value) -> Result<T, ConfigError> {
    T::from_value(value).ok_or_else(|| ConfigError::WrongType { path: path.to_string(), expected: T::EXPECTED })
}
