//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] over the ESP-IDF NVS flash partition.  Each
//! operation opens the namespace, acts, commits, and closes — NVS commits
//! are atomic per key, which is the only write atomicity this design
//! relies on (last writer wins, no multi-key transaction).
//!
//! On non-ESP targets the adapter is an in-memory map so host tests can
//! exercise the schedule persistence paths unchanged.

use crate::app::ports::StoragePort;
use crate::error::StorageError;
use log::info;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::collections::HashMap<(String, String), Vec<u8>>,
}

impl NvsAdapter {
    /// Initialise NVS flash and return the adapter.
    ///
    /// A partition left by an older NVS layout (or a truncated erase) is
    /// wiped and re-initialised rather than failing boot.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        espidf::flash_init()?;

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::collections::HashMap::new(),
        })
    }
}

#[cfg(not(target_os = "espidf"))]
impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self
            .store
            .get(&(namespace.to_string(), key.to_string()))
            .ok_or(StorageError::NotFound)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.store
            .insert((namespace.to_string(), key.to_string()), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.store
            .remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store
            .contains_key(&(namespace.to_string(), key.to_string()))
    }
}

#[cfg(target_os = "espidf")]
impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let ns = espidf::Namespace::open(namespace, false)?;
        ns.get_blob(key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let ns = espidf::Namespace::open(namespace, true)?;
        ns.set_blob(key, data)?;
        ns.commit()
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let ns = espidf::Namespace::open(namespace, true)?;
        ns.erase(key)?;
        ns.commit()
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        match espidf::Namespace::open(namespace, false) {
            Ok(ns) => ns.contains(key),
            Err(_) => false,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod espidf {
    use super::*;
    use esp_idf_svc::sys::*;
    use log::warn;

    pub fn flash_init() -> Result<(), StorageError> {
        // SAFETY: nvs_flash_init / nvs_flash_erase run once from the main
        // task before any other NVS access.
        unsafe {
            match nvs_flash_init() {
                ESP_OK => {}
                ESP_ERR_NVS_NO_FREE_PAGES | ESP_ERR_NVS_NEW_VERSION_FOUND => {
                    warn!("NVS: stale partition, erasing and re-initialising");
                    if nvs_flash_erase() != ESP_OK || nvs_flash_init() != ESP_OK {
                        return Err(StorageError::IoError);
                    }
                }
                _ => return Err(StorageError::IoError),
            }
        }
        info!("NvsAdapter: ESP-IDF NVS initialised");
        Ok(())
    }

    /// NVS keys and namespaces are at most 15 bytes; longer names are
    /// truncated to the NVS limit.
    fn c_name(name: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let bytes = name.as_bytes();
        let len = bytes.len().min(15);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    /// An open NVS namespace handle, closed on drop.
    pub struct Namespace {
        handle: nvs_handle_t,
    }

    impl Namespace {
        pub fn open(namespace: &str, writable: bool) -> Result<Self, StorageError> {
            let ns = c_name(namespace);
            let mode = if writable {
                nvs_open_mode_t_NVS_READWRITE
            } else {
                nvs_open_mode_t_NVS_READONLY
            };
            let mut handle: nvs_handle_t = 0;
            // SAFETY: ns is a NUL-terminated buffer; handle outlives the call.
            let ret = unsafe { nvs_open(ns.as_ptr().cast(), mode, &mut handle) };
            if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            Ok(Self { handle })
        }

        pub fn get_blob(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
            let key = c_name(key);
            let mut size = buf.len();
            // SAFETY: buf/size describe a valid writable region.
            let ret = unsafe {
                nvs_get_blob(self.handle, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
            };
            match ret {
                ESP_OK => Ok(size),
                ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                _ => Err(StorageError::IoError),
            }
        }

        pub fn set_blob(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
            let key = c_name(key);
            // SAFETY: data pointer/length describe a valid readable region.
            let ret = unsafe {
                nvs_set_blob(self.handle, key.as_ptr().cast(), data.as_ptr().cast(), data.len())
            };
            match ret {
                ESP_OK => Ok(()),
                ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(StorageError::Full),
                _ => {
                    warn!("NVS: set_blob failed (rc={})", ret);
                    Err(StorageError::IoError)
                }
            }
        }

        pub fn erase(&self, key: &str) -> Result<(), StorageError> {
            let key = c_name(key);
            // SAFETY: handle is open read-write.
            let ret = unsafe { nvs_erase_key(self.handle, key.as_ptr().cast()) };
            // Erasing a missing key still reports success to the caller.
            if ret == ESP_OK || ret == ESP_ERR_NVS_NOT_FOUND {
                Ok(())
            } else {
                Err(StorageError::IoError)
            }
        }

        pub fn contains(&self, key: &str) -> bool {
            let key = c_name(key);
            // SAFETY: out-pointer may be null when only existence is probed.
            let ret =
                unsafe { nvs_find_key(self.handle, key.as_ptr().cast(), core::ptr::null_mut()) };
            ret == ESP_OK
        }

        pub fn commit(&self) -> Result<(), StorageError> {
            // SAFETY: handle is open read-write.
            let ret = unsafe { nvs_commit(self.handle) };
            if ret == ESP_OK {
                Ok(())
            } else {
                Err(StorageError::IoError)
            }
        }
    }

    impl Drop for Namespace {
        fn drop(&mut self) {
            // SAFETY: handle came from nvs_open and is closed exactly once.
            unsafe { nvs_close(self.handle) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_round_trip() {
        let mut nvs = NvsAdapter::new().unwrap();
        let data = b"hello NVS";
        nvs.write("test_ns", "greeting", data).unwrap();
        assert!(nvs.exists("test_ns", "greeting"));

        let mut buf = [0u8; 64];
        let len = nvs.read("test_ns", "greeting", &mut buf).unwrap();
        assert_eq!(&buf[..len], data);

        nvs.delete("test_ns", "greeting").unwrap();
        assert!(!nvs.exists("test_ns", "greeting"));
    }

    #[test]
    fn read_missing_key_is_not_found() {
        let nvs = NvsAdapter::new().unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(
            nvs.read("ns", "nope", &mut buf),
            Err(StorageError::NotFound)
        );
    }

    #[test]
    fn delete_missing_key_is_ok() {
        let mut nvs = NvsAdapter::new().unwrap();
        assert!(nvs.delete("ns", "nope").is_ok());
    }

    #[test]
    fn namespaces_do_not_collide() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write("ns_a", "key", b"alpha").unwrap();
        nvs.write("ns_b", "key", b"bravo").unwrap();

        let mut buf = [0u8; 64];
        let len = nvs.read("ns_a", "key", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"alpha");

        let len = nvs.read("ns_b", "key", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"bravo");
    }

    #[test]
    fn schedule_table_persists_through_adapter() {
        use crate::schedule::ScheduleTable;

        let mut nvs = NvsAdapter::new().unwrap();
        let mut table = ScheduleTable::new(15);
        table.update_entry(2, 18, 45, 25, true).unwrap();
        table.save(&mut nvs).unwrap();

        let loaded = ScheduleTable::load(&nvs, 15);
        assert_eq!(loaded.entries()[2].hour, 18);
        assert_eq!(loaded.entries()[2].minute, 45);
        assert_eq!(loaded.entries()[2].amount, 25);
        assert!(loaded.entries()[2].enabled);
    }
}
