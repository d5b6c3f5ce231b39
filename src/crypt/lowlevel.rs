//! Bindings to the crypt family of functions in the host's libcrypt
//! (libxcrypt), loaded at runtime.

use std::ffi::{CStr, c_char, c_int, c_ulong, c_void};
use std::io;
use std::ptr;

use libloading::Library;

use super::CryptError;

const LIBRARY_NAMES: [&str; 3] = ["libcrypt.so.1", "libcrypt.so.2", "libcrypt.so"];

// sizeof(struct crypt_data) in libxcrypt
const CRYPT_DATA_SIZE: usize = 32768;
const CRYPT_GENSALT_OUTPUT_SIZE: usize = 192;
const PROBE_RANDOM_BYTES: usize = 32;

type CryptRnFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *mut c_void, c_int) -> *mut c_char;
type CryptGensaltRnFn = unsafe extern "C" fn(
    *const c_char,
    c_ulong,
    *const c_char,
    c_int,
    *mut c_char,
    c_int,
) -> *mut c_char;
type CryptPreferredMethodFn = unsafe extern "C" fn() -> *const c_char;

pub(super) struct LowLevel {
    crypt_rn: CryptRnFn,
    crypt_gensalt_rn: CryptGensaltRnFn,
    crypt_preferred_method: CryptPreferredMethodFn,
    // keeps the function pointers above valid
    _library: Library,
}

impl std::fmt::Debug for LowLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LowLevel").finish_non_exhaustive()
    }
}

impl LowLevel {
    pub(super) fn load() -> Result<Self, CryptError> {
        let mut last_error = String::from("no candidate library names");
        for name in LIBRARY_NAMES {
            // SAFETY: libcrypt has no library constructors with observable side effects.
            match unsafe { Library::new(name) } {
                Ok(library) => return Self::from_library(library),
                Err(err) => last_error = err.to_string(),
            }
        }
        Err(CryptError::LibraryUnavailable(last_error))
    }

    fn from_library(library: Library) -> Result<Self, CryptError> {
        // SAFETY: the function types match the prototypes in <crypt.h>, and the
        // copied pointers are only used while `library` is alive.
        unsafe {
            let crypt_rn = *library
                .get::<CryptRnFn>(b"crypt_rn\0")
                .map_err(|_| CryptError::MissingCapability("crypt_rn"))?;
            let crypt_gensalt_rn = *library
                .get::<CryptGensaltRnFn>(b"crypt_gensalt_rn\0")
                .map_err(|_| CryptError::MissingCapability("crypt_gensalt_rn"))?;
            let crypt_preferred_method = *library
                .get::<CryptPreferredMethodFn>(b"crypt_preferred_method\0")
                .map_err(|_| CryptError::MissingCapability("crypt_preferred_method"))?;
            Ok(Self {
                crypt_rn,
                crypt_gensalt_rn,
                crypt_preferred_method,
                _library: library,
            })
        }
    }

    /// Checks that a null prefix selects the default method and that a null
    /// random-bytes argument draws entropy from the system.
    pub(super) fn feature_test(&self) -> Result<(), CryptError> {
        let mut probe = [0u8; PROBE_RANDOM_BYTES];
        ring::rand::SecureRandom::fill(&ring::rand::SystemRandom::new(), &mut probe)
            .map_err(|_| CryptError::Failed {
                operation: "feature test",
                reason: "cannot read system randomness".to_string(),
            })?;
        self.gensalt(None, Some(&probe))
            .map_err(|_| CryptError::MissingCapability("CRYPT_GENSALT_IMPLEMENTS_DEFAULT_PREFIX"))?;

        let preferred = self.preferred_method()?;
        let preferred = std::ffi::CString::new(preferred).map_err(|_| CryptError::InvalidInput)?;
        self.gensalt(Some(&preferred), None)
            .map_err(|_| CryptError::MissingCapability("CRYPT_GENSALT_IMPLEMENTS_AUTO_ENTROPY"))?;
        Ok(())
    }

    pub(super) fn preferred_method(&self) -> Result<String, CryptError> {
        // SAFETY: returns a pointer to a static string or null.
        let method = unsafe { (self.crypt_preferred_method)() };
        if method.is_null() {
            return Err(CryptError::MissingCapability("a preferred hashing method"));
        }
        // SAFETY: non-null results point to a static NUL-terminated string.
        owned_string(unsafe { CStr::from_ptr(method) })
    }

    /// Wraps `crypt_gensalt_rn()`. `None` for `random` asks the library to
    /// draw its own entropy.
    pub(super) fn gensalt(
        &self,
        prefix: Option<&CStr>,
        random: Option<&[u8]>,
    ) -> Result<String, CryptError> {
        let (rbytes, nrbytes) = match random {
            Some(bytes) => (
                bytes.as_ptr().cast::<c_char>(),
                c_int::try_from(bytes.len()).map_err(|_| CryptError::InvalidInput)?,
            ),
            None => (ptr::null(), 0),
        };
        let mut output = [0u8; CRYPT_GENSALT_OUTPUT_SIZE];
        let output_size = c_int::try_from(output.len()).map_err(|_| CryptError::InvalidInput)?;

        // SAFETY: all pointers are valid for the duration of the call and
        // `output` is exactly `output_size` bytes long.
        let result = unsafe {
            (self.crypt_gensalt_rn)(
                prefix.map_or(ptr::null(), CStr::as_ptr),
                0,
                rbytes,
                nrbytes,
                output.as_mut_ptr().cast::<c_char>(),
                output_size,
            )
        };
        if result.is_null() {
            return Err(last_os_error("crypt_gensalt_rn"));
        }
        // SAFETY: on success the setting was written NUL-terminated into `output`.
        owned_string(unsafe { CStr::from_ptr(result) })
    }

    /// Wraps `crypt_rn()` with a scratch area owned by this call.
    pub(super) fn crypt(&self, phrase: &CStr, setting: &CStr) -> Result<String, CryptError> {
        let mut data = vec![0u8; CRYPT_DATA_SIZE];
        let size = c_int::try_from(data.len()).map_err(|_| CryptError::InvalidInput)?;

        // SAFETY: `data` is a zeroed buffer of `size` bytes that outlives the call.
        let result = unsafe {
            (self.crypt_rn)(
                phrase.as_ptr(),
                setting.as_ptr(),
                data.as_mut_ptr().cast::<c_void>(),
                size,
            )
        };
        if result.is_null() {
            return Err(last_os_error("crypt_rn"));
        }
        // SAFETY: the result points into `data`, which is still alive here;
        // it is copied out before `data` is dropped.
        owned_string(unsafe { CStr::from_ptr(result) })
    }
}

fn owned_string(value: &CStr) -> Result<String, CryptError> {
    value
        .to_str()
        .map(ToOwned::to_owned)
        .map_err(|_| CryptError::InvalidResult(value.to_string_lossy().into_owned()))
}

fn last_os_error(operation: &'static str) -> CryptError {
    CryptError::Failed {
        operation,
        reason: io::Error::last_os_error().to_string(),
    }
}
