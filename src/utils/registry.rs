// src/utils/registry.rs

use std::fmt;

use strum_macros::{AsRefStr, Display, EnumString};

use crate::errors::StoreError;

/// Root of a registry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum RegistryHive {
    #[strum(to_string = "HKLM", serialize = "HKEY_LOCAL_MACHINE")]
    LocalMachine,
    #[strum(to_string = "HKCU", serialize = "HKEY_CURRENT_USER")]
    CurrentUser,
    #[strum(to_string = "HKCR", serialize = "HKEY_CLASSES_ROOT")]
    ClassesRoot,
    #[strum(to_string = "HKU", serialize = "HKEY_USERS")]
    Users,
    #[strum(to_string = "HKCC", serialize = "HKEY_CURRENT_CONFIG")]
    CurrentConfig,
}

/// Enumeration of supported registry key value types.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RegistryKeyValue {
    Dword(u32),
    Qword(u64),
    String(String),
    ExpandString(String),
    MultiString(Vec<String>),
    Binary(Vec<u8>),
}

/// Type tag of a registry value, persisted alongside backups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ValueKind {
    DWord,
    QWord,
    String,
    ExpandString,
    MultiString,
    Binary,
    /// The value did not exist when it was captured.
    Unknown,
}

impl RegistryKeyValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            RegistryKeyValue::Dword(_) => ValueKind::DWord,
            RegistryKeyValue::Qword(_) => ValueKind::QWord,
            RegistryKeyValue::String(_) => ValueKind::String,
            RegistryKeyValue::ExpandString(_) => ValueKind::ExpandString,
            RegistryKeyValue::MultiString(_) => ValueKind::MultiString,
            RegistryKeyValue::Binary(_) => ValueKind::Binary,
        }
    }

    pub fn as_dword(&self) -> Option<u32> {
        match self {
            RegistryKeyValue::Dword(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RegistryKeyValue::String(s) | RegistryKeyValue::ExpandString(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for RegistryKeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryKeyValue::Dword(v) => write!(f, "Dword({})", v),
            RegistryKeyValue::Qword(v) => write!(f, "Qword({})", v),
            RegistryKeyValue::String(v) => write!(f, "String({})", v),
            RegistryKeyValue::ExpandString(v) => write!(f, "ExpandString({})", v),
            RegistryKeyValue::MultiString(v) => write!(f, "MultiString({})", v.join(", ")),
            RegistryKeyValue::Binary(v) => write!(f, "Binary({:?})", v),
        }
    }
}

/// Access to persistent configuration values.
///
/// Paths are relative to the hive and use `\` separators. Implementations treat a
/// missing key the same as a missing value: reads return `Ok(None)` and deletes succeed.
pub trait ConfigurationStore: Send + Sync {
    fn key_exists(&self, hive: RegistryHive, path: &str) -> Result<bool, StoreError>;

    /// # Returns
    ///
    /// - `Ok(Some(RegistryKeyValue))` if the value exists.
    /// - `Ok(None)` if the value (or its key) doesn't exist.
    /// - `Err(StoreError)` if the value could not be read.
    fn read_value(
        &self,
        hive: RegistryHive,
        path: &str,
        name: &str,
    ) -> Result<Option<RegistryKeyValue>, StoreError>;

    /// Writes `value`, creating intermediate keys as needed.
    fn write_value(
        &self,
        hive: RegistryHive,
        path: &str,
        name: &str,
        value: &RegistryKeyValue,
    ) -> Result<(), StoreError>;

    fn delete_value(&self, hive: RegistryHive, path: &str, name: &str) -> Result<(), StoreError>;

    /// Names of the direct subkeys of `path`; empty if the key doesn't exist.
    fn subkeys(&self, hive: RegistryHive, path: &str) -> Result<Vec<String>, StoreError>;

    fn read_value_or(
        &self,
        hive: RegistryHive,
        path: &str,
        name: &str,
        default: RegistryKeyValue,
    ) -> RegistryKeyValue {
        match self.read_value(hive, path, name) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                tracing::debug!("{}\\{} -> Falling back to default: {}", hive, path, e);
                default
            }
        }
    }
}

/// Formats `hive` and `path` as a full registry path, e.g. `HKLM\SOFTWARE\...`.
pub fn full_path(hive: RegistryHive, path: &str) -> String {
    format!("{}\\{}", hive, path)
}

/// Parses the full registry path into hive and subkey path.
///
/// Accepts both long (`HKEY_LOCAL_MACHINE\...`) and short (`HKLM\...`) hive names.
pub fn parse_registry_path(path: &str) -> Result<(RegistryHive, String), StoreError> {
    let components: Vec<&str> = path.split('\\').filter(|c| !c.is_empty()).collect();
    if components.len() < 2 {
        return Err(StoreError::InvalidPath(format!(
            "'{}'. Expected format 'HKEY_*\\Subkey\\...'",
            path
        )));
    }
    let hive = components[0]
        .parse::<RegistryHive>()
        .map_err(|_| StoreError::UnsupportedHive(components[0].to_string()))?;
    Ok((hive, components[1..].join("\\")))
}

/// Lays `items` out as `REG_MULTI_SZ` text: every item NUL-terminated, then one more NUL.
#[cfg_attr(not(windows), allow(dead_code))]
fn join_multi_sz(items: &[String]) -> String {
    let mut text: String = items.iter().flat_map(|item| [item.as_str(), "\0"]).collect();
    text.push('\0');
    text
}

/// Inverse of [`join_multi_sz`]. Only the list terminator and the last item's terminator
/// are stripped, so a list holding one empty string survives. Data missing its final NUL
/// is accepted.
#[cfg_attr(not(windows), allow(dead_code))]
fn split_multi_sz(text: &str) -> Vec<String> {
    let body = text.strip_suffix('\0').unwrap_or(text);
    if body.is_empty() {
        return Vec::new();
    }
    let body = body.strip_suffix('\0').unwrap_or(body);
    body.split('\0').map(str::to_string).collect()
}

#[cfg(windows)]
mod win {
    use std::io;

    use winreg::{
        enums::{
            RegType::{
                REG_BINARY, REG_DWORD, REG_EXPAND_SZ, REG_MULTI_SZ, REG_QWORD, REG_SZ,
            },
            HKEY_CLASSES_ROOT, HKEY_CURRENT_CONFIG, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE,
            HKEY_USERS, KEY_ALL_ACCESS, KEY_READ, KEY_WOW64_64KEY, KEY_WRITE,
        },
        RegKey, RegValue,
    };

    use super::{
        full_path, join_multi_sz, split_multi_sz, ConfigurationStore, RegistryHive,
        RegistryKeyValue,
    };
    use crate::errors::StoreError;

    /// The live Windows registry, always viewed through the 64-bit hive.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct WindowsRegistry;

    impl WindowsRegistry {
        fn root(hive: RegistryHive) -> RegKey {
            RegKey::predef(match hive {
                RegistryHive::LocalMachine => HKEY_LOCAL_MACHINE,
                RegistryHive::CurrentUser => HKEY_CURRENT_USER,
                RegistryHive::ClassesRoot => HKEY_CLASSES_ROOT,
                RegistryHive::Users => HKEY_USERS,
                RegistryHive::CurrentConfig => HKEY_CURRENT_CONFIG,
            })
        }

        /// Opens `path` for reading; `Ok(None)` if the key doesn't exist.
        fn open(hive: RegistryHive, path: &str, flags: u32) -> Result<Option<RegKey>, StoreError> {
            match Self::root(hive).open_subkey_with_flags(path, flags | KEY_WOW64_64KEY) {
                Ok(key) => Ok(Some(key)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(StoreError::KeyOpenError {
                    path: full_path(hive, path),
                    reason: e.to_string(),
                }),
            }
        }
    }

    fn decode_utf16(bytes: &[u8]) -> String {
        let wide: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();
        String::from_utf16_lossy(&wide)
    }

    fn encode_utf16(s: &str) -> Vec<u8> {
        s.encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(|c| c.to_le_bytes())
            .collect()
    }

    fn decode(name: &str, value: RegValue) -> Result<RegistryKeyValue, StoreError> {
        let vtype = format!("{:?}", value.vtype);
        let too_small = || StoreError::ReadValueError {
            path: String::new(),
            name: name.to_string(),
            reason: format!("{} data too small", vtype),
        };
        match value.vtype {
            REG_DWORD => {
                let bytes: [u8; 4] = value
                    .bytes
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(too_small)?;
                Ok(RegistryKeyValue::Dword(u32::from_le_bytes(bytes)))
            }
            REG_QWORD => {
                let bytes: [u8; 8] = value
                    .bytes
                    .get(..8)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(too_small)?;
                Ok(RegistryKeyValue::Qword(u64::from_le_bytes(bytes)))
            }
            REG_SZ => Ok(RegistryKeyValue::String(
                decode_utf16(&value.bytes).trim_end_matches('\0').to_string(),
            )),
            REG_EXPAND_SZ => Ok(RegistryKeyValue::ExpandString(
                decode_utf16(&value.bytes).trim_end_matches('\0').to_string(),
            )),
            REG_MULTI_SZ => Ok(RegistryKeyValue::MultiString(split_multi_sz(
                &decode_utf16(&value.bytes),
            ))),
            REG_BINARY => Ok(RegistryKeyValue::Binary(value.bytes)),
            _ => Err(StoreError::UnsupportedType {
                name: name.to_string(),
                kind: vtype,
            }),
        }
    }

    fn encode(value: &RegistryKeyValue) -> RegValue {
        match value {
            RegistryKeyValue::Dword(v) => RegValue {
                bytes: v.to_le_bytes().to_vec(),
                vtype: REG_DWORD,
            },
            RegistryKeyValue::Qword(v) => RegValue {
                bytes: v.to_le_bytes().to_vec(),
                vtype: REG_QWORD,
            },
            RegistryKeyValue::String(s) => RegValue {
                bytes: encode_utf16(s),
                vtype: REG_SZ,
            },
            RegistryKeyValue::ExpandString(s) => RegValue {
                bytes: encode_utf16(s),
                vtype: REG_EXPAND_SZ,
            },
            RegistryKeyValue::MultiString(items) => RegValue {
                bytes: join_multi_sz(items)
                    .encode_utf16()
                    .flat_map(|c| c.to_le_bytes())
                    .collect(),
                vtype: REG_MULTI_SZ,
            },
            RegistryKeyValue::Binary(data) => RegValue {
                bytes: data.clone(),
                vtype: REG_BINARY,
            },
        }
    }

    impl ConfigurationStore for WindowsRegistry {
        fn key_exists(&self, hive: RegistryHive, path: &str) -> Result<bool, StoreError> {
            Ok(Self::open(hive, path, KEY_READ)?.is_some())
        }

        fn read_value(
            &self,
            hive: RegistryHive,
            path: &str,
            name: &str,
        ) -> Result<Option<RegistryKeyValue>, StoreError> {
            let Some(key) = Self::open(hive, path, KEY_READ)? else {
                return Ok(None);
            };
            match key.get_raw_value(name) {
                Ok(value) => decode(name, value).map(Some).map_err(|e| match e {
                    StoreError::ReadValueError { name, reason, .. } => StoreError::ReadValueError {
                        path: full_path(hive, path),
                        name,
                        reason,
                    },
                    other => other,
                }),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(StoreError::ReadValueError {
                    path: full_path(hive, path),
                    name: name.to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        fn write_value(
            &self,
            hive: RegistryHive,
            path: &str,
            name: &str,
            value: &RegistryKeyValue,
        ) -> Result<(), StoreError> {
            // create_subkey creates all intermediate subkeys if they don't exist
            let (key, _) = Self::root(hive)
                .create_subkey_with_flags(path, KEY_ALL_ACCESS | KEY_WOW64_64KEY)
                .map_err(|e| StoreError::KeyOpenError {
                    path: full_path(hive, path),
                    reason: e.to_string(),
                })?;
            key.set_raw_value(name, &encode(value))
                .map_err(|e| StoreError::SetValueError {
                    path: full_path(hive, path),
                    name: name.to_string(),
                    reason: e.to_string(),
                })
        }

        fn delete_value(
            &self,
            hive: RegistryHive,
            path: &str,
            name: &str,
        ) -> Result<(), StoreError> {
            let Some(key) = Self::open(hive, path, KEY_WRITE)? else {
                return Ok(());
            };
            match key.delete_value(name) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StoreError::DeleteValueError {
                    path: full_path(hive, path),
                    name: name.to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        fn subkeys(&self, hive: RegistryHive, path: &str) -> Result<Vec<String>, StoreError> {
            let Some(key) = Self::open(hive, path, KEY_READ)? else {
                return Ok(Vec::new());
            };
            key.enum_keys()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::KeyOpenError {
                    path: full_path(hive, path),
                    reason: e.to_string(),
                })
        }
    }
}

#[cfg(windows)]
pub use win::WindowsRegistry;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry_path() {
        let (hive, path) =
            parse_registry_path(r"HKEY_LOCAL_MACHINE\SOFTWARE\Policies\Microsoft").unwrap();
        assert_eq!(hive, RegistryHive::LocalMachine);
        assert_eq!(path, r"SOFTWARE\Policies\Microsoft");

        let (hive, path) = parse_registry_path(r"hkcu\Control Panel\Desktop").unwrap();
        assert_eq!(hive, RegistryHive::CurrentUser);
        assert_eq!(path, r"Control Panel\Desktop");
    }

    #[test]
    fn test_invalid_registry_path() {
        let invalid_paths = vec![
            "",
            "INVALID_HIVE\\Software",
            "HKEY_UNKNOWN\\Software",
            "HKEY_CURRENT_USER", // Missing subkey
        ];

        for path in invalid_paths {
            let result = parse_registry_path(path);
            assert!(result.is_err(), "Path '{}' should be invalid", path);
        }
    }

    #[test]
    fn test_hive_prefixes() {
        assert_eq!(RegistryHive::LocalMachine.to_string(), "HKLM");
        assert_eq!(RegistryHive::CurrentConfig.to_string(), "HKCC");
        assert_eq!("HKU".parse::<RegistryHive>().ok(), Some(RegistryHive::Users));
        assert_eq!(
            full_path(RegistryHive::CurrentUser, r"Control Panel\Desktop"),
            r"HKCU\Control Panel\Desktop"
        );
    }

    #[test]
    fn test_value_kind() {
        assert_eq!(RegistryKeyValue::Dword(1).kind(), ValueKind::DWord);
        assert_eq!(
            RegistryKeyValue::MultiString(vec!["a".into()]).kind(),
            ValueKind::MultiString
        );
        assert_eq!("multistring".parse::<ValueKind>().ok(), Some(ValueKind::MultiString));
        assert_eq!(RegistryKeyValue::String("0".into()).as_str(), Some("0"));
    }

    #[test]
    fn test_multi_sz_layout() {
        let servers = vec!["1.1.1.1".to_string(), "1.0.0.1".to_string()];
        assert_eq!(join_multi_sz(&servers), "1.1.1.1\01.0.0.1\0\0");
        assert_eq!(split_multi_sz("1.1.1.1\01.0.0.1\0\0"), servers);
        assert_eq!(split_multi_sz("1.1.1.1\01.0.0.1"), servers);
    }

    #[test]
    fn test_multi_sz_empty_item_is_kept() {
        let empty_item = vec![String::new()];
        assert_eq!(join_multi_sz(&empty_item), "\0\0");
        assert_eq!(split_multi_sz(&join_multi_sz(&empty_item)), empty_item);

        assert_eq!(join_multi_sz(&[]), "\0");
        assert!(split_multi_sz("\0").is_empty());
        assert!(split_multi_sz("").is_empty());

        let trailing_empty = vec!["a".to_string(), String::new()];
        assert_eq!(split_multi_sz(&join_multi_sz(&trailing_empty)), trailing_empty);
    }

    #[cfg(windows)]
    mod live {
        use std::sync::Mutex;

        use super::super::*;

        static TEST_MUTEX: Mutex<()> = Mutex::new(());

        const TEST_SUBKEY: &str = "Software\\WinTweakerRegistryTest";

        fn roundtrip(name: &str, value: RegistryKeyValue) {
            let _lock = TEST_MUTEX.lock().unwrap(); // Ensure tests run serially
            let store = WindowsRegistry;
            let hive = RegistryHive::CurrentUser;

            // Ensure clean state
            let _ = store.delete_value(hive, TEST_SUBKEY, name);

            store
                .write_value(hive, TEST_SUBKEY, name, &value)
                .expect("Failed to set value");
            let read_value = store
                .read_value(hive, TEST_SUBKEY, name)
                .expect("Failed to read value");
            assert_eq!(read_value, Some(value));

            store
                .delete_value(hive, TEST_SUBKEY, name)
                .expect("Failed to delete value");
            let read_deleted = store
                .read_value(hive, TEST_SUBKEY, name)
                .expect("Failed to read deleted value");
            assert_eq!(read_deleted, None);
        }

        #[test]
        #[ignore = "writes to the live HKCU hive"]
        fn test_create_modify_read_delete_dword() {
            roundtrip("TestDword", RegistryKeyValue::Dword(42));
        }

        #[test]
        #[ignore = "writes to the live HKCU hive"]
        fn test_create_modify_read_delete_multi_string() {
            roundtrip(
                "TestMulti",
                RegistryKeyValue::MultiString(vec!["1.1.1.1".into(), "1.0.0.1".into()]),
            );
        }

        #[test]
        #[ignore = "reads the live HKCU hive"]
        fn test_nonexistent_key() {
            let store = WindowsRegistry;
            let path = "Software\\WinTweakerRegistryTest\\DoesNotExist";
            assert_eq!(
                store
                    .read_value(RegistryHive::CurrentUser, path, "Missing")
                    .unwrap(),
                None
            );
            assert!(store
                .subkeys(RegistryHive::CurrentUser, path)
                .unwrap()
                .is_empty());
        }
    }
}
