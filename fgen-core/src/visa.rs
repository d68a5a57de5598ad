//! VISA transport: loads the platform VISA shared library at runtime via
//! `libloading` and exposes it through the [`InstrumentLink`] seam.
//!
//! Only the handful of entry points the channel needs are resolved
//! (open/close, read/write, timeout attribute, flush). Loading is lazy and
//! failure is non-fatal: a missing library surfaces as
//! [`LinkError::Unavailable`] from [`VisaLink::load`] or `open`.

use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::Arc;

use libloading::Library;

use crate::link::{InstrumentLink, LinkError, LinkResult, LinkSession};

type ViStatus = i32;
type ViSession = u32;
type ViObject = u32;

const VI_SUCCESS: ViStatus = 0;
/// `VI_ERROR_TMO`: the read window elapsed.
const VI_ERROR_TMO: ViStatus = 0xBFFF_0015_u32 as i32;
/// `VI_ATTR_TMO_VALUE`: I/O timeout attribute, milliseconds.
const VI_ATTR_TMO_VALUE: u32 = 0x3FFF_001A;
/// Flush mask for the write buffer.
const VI_FLUSH_ON_WRITE: u16 = 0x0002;

type ViOpenDefaultRmFn = unsafe extern "C" fn(*mut ViSession) -> ViStatus;
type ViOpenFn =
    unsafe extern "C" fn(ViSession, *const c_char, u32, u32, *mut ViSession) -> ViStatus;
type ViCloseFn = unsafe extern "C" fn(ViObject) -> ViStatus;
type ViWriteFn = unsafe extern "C" fn(ViSession, *const u8, u32, *mut u32) -> ViStatus;
type ViReadFn = unsafe extern "C" fn(ViSession, *mut u8, u32, *mut u32) -> ViStatus;
type ViSetAttributeFn = unsafe extern "C" fn(ViObject, u32, u64) -> ViStatus;
type ViFlushFn = unsafe extern "C" fn(ViSession, u16) -> ViStatus;

#[cfg(target_os = "windows")]
const VISA_CANDIDATES: &[&str] = &[
    "visa64.dll",
    "visa32.dll",
    "C:\\Program Files\\IVI Foundation\\VISA\\Win64\\bin\\visa64.dll",
];

#[cfg(target_os = "macos")]
const VISA_CANDIDATES: &[&str] = &[
    "/Library/Frameworks/VISA.framework/VISA",
    "libvisa.dylib",
];

#[cfg(all(unix, not(target_os = "macos")))]
const VISA_CANDIDATES: &[&str] = &["libvisa.so", "librsvisa.so", "libiovisa.so"];

/// Resolved VISA entry points. The raw fn pointers are copied out of their
/// `Symbol`s; `_lib` keeps the library mapped for as long as they are used.
struct VisaApi {
    _lib: Library,
    open_default_rm: ViOpenDefaultRmFn,
    open: ViOpenFn,
    close: ViCloseFn,
    write: ViWriteFn,
    read: ViReadFn,
    set_attribute: ViSetAttributeFn,
    flush: ViFlushFn,
}

impl VisaApi {
    fn load() -> Result<Self, String> {
        let mut last_err = String::new();
        for candidate in VISA_CANDIDATES {
            // Loading an arbitrary shared object is inherently unsafe; VISA
            // vendors guarantee no unsound initialization side effects.
            match unsafe { Library::new(candidate) } {
                Ok(lib) => return Self::resolve(lib, candidate),
                Err(e) => last_err = format!("{}: {}", candidate, e),
            }
        }
        Err(format!("no VISA library found ({})", last_err))
    }

    fn resolve(lib: Library, candidate: &str) -> Result<Self, String> {
        unsafe {
            let open_default_rm = *lib
                .get::<ViOpenDefaultRmFn>(b"viOpenDefaultRM\0")
                .map_err(|e| format!("{}: viOpenDefaultRM: {}", candidate, e))?;
            let open = *lib
                .get::<ViOpenFn>(b"viOpen\0")
                .map_err(|e| format!("{}: viOpen: {}", candidate, e))?;
            let close = *lib
                .get::<ViCloseFn>(b"viClose\0")
                .map_err(|e| format!("{}: viClose: {}", candidate, e))?;
            let write = *lib
                .get::<ViWriteFn>(b"viWrite\0")
                .map_err(|e| format!("{}: viWrite: {}", candidate, e))?;
            let read = *lib
                .get::<ViReadFn>(b"viRead\0")
                .map_err(|e| format!("{}: viRead: {}", candidate, e))?;
            let set_attribute = *lib
                .get::<ViSetAttributeFn>(b"viSetAttribute\0")
                .map_err(|e| format!("{}: viSetAttribute: {}", candidate, e))?;
            let flush = *lib
                .get::<ViFlushFn>(b"viFlush\0")
                .map_err(|e| format!("{}: viFlush: {}", candidate, e))?;
            Ok(VisaApi {
                _lib: lib,
                open_default_rm,
                open,
                close,
                write,
                read,
                set_attribute,
                flush,
            })
        }
    }
}

fn status_err(what: &str, status: ViStatus) -> LinkError {
    if status == VI_ERROR_TMO {
        LinkError::Timeout
    } else {
        LinkError::Io(format!("{} failed with VISA status {:#010x}", what, status as u32))
    }
}

/// VISA-backed [`InstrumentLink`].
pub struct VisaLink {
    api: Arc<VisaApi>,
}

impl VisaLink {
    /// Load the platform VISA library and resolve entry points.
    pub fn load() -> LinkResult<Self> {
        let api = VisaApi::load().map_err(LinkError::Unavailable)?;
        log::info!(target: "device::visa", "VISA library loaded");
        Ok(VisaLink { api: Arc::new(api) })
    }
}

impl InstrumentLink for VisaLink {
    fn open(&self, resource: &str) -> LinkResult<Box<dyn LinkSession>> {
        let api = self.api.clone();
        let resource_c = CString::new(resource)
            .map_err(|_| LinkError::Io(format!("invalid resource string: {:?}", resource)))?;

        let mut rm: ViSession = 0;
        let status = unsafe { (api.open_default_rm)(&mut rm) };
        if status != VI_SUCCESS {
            return Err(status_err("viOpenDefaultRM", status));
        }

        let mut session: ViSession = 0;
        let status = unsafe { (api.open)(rm, resource_c.as_ptr(), 0, 0, &mut session) };
        if status != VI_SUCCESS {
            unsafe { (api.close)(rm) };
            return Err(status_err("viOpen", status));
        }

        log::info!(target: "device::visa", "opened session on {}", resource);
        Ok(Box::new(VisaSession { api, rm, session }))
    }
}

struct VisaSession {
    api: Arc<VisaApi>,
    rm: ViSession,
    session: ViSession,
}

impl LinkSession for VisaSession {
    fn write(&mut self, bytes: &[u8]) -> LinkResult {
        let mut written: u32 = 0;
        let status = unsafe {
            (self.api.write)(self.session, bytes.as_ptr(), bytes.len() as u32, &mut written)
        };
        if status != VI_SUCCESS {
            return Err(status_err("viWrite", status));
        }
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> LinkResult<Vec<u8>> {
        let mut buffer = vec![0u8; max_len];
        let mut count: u32 = 0;
        let status = unsafe {
            (self.api.read)(self.session, buffer.as_mut_ptr(), max_len as u32, &mut count)
        };
        if status != VI_SUCCESS {
            return Err(status_err("viRead", status));
        }
        buffer.truncate(count as usize);
        Ok(buffer)
    }

    fn set_timeout_ms(&mut self, timeout_ms: u32) -> LinkResult {
        let status = unsafe {
            (self.api.set_attribute)(self.session, VI_ATTR_TMO_VALUE, timeout_ms as u64)
        };
        if status != VI_SUCCESS {
            return Err(status_err("viSetAttribute", status));
        }
        Ok(())
    }

    fn flush(&mut self) -> LinkResult {
        let status = unsafe { (self.api.flush)(self.session, VI_FLUSH_ON_WRITE) };
        if status != VI_SUCCESS {
            return Err(status_err("viFlush", status));
        }
        Ok(())
    }
}

impl Drop for VisaSession {
    fn drop(&mut self) {
        unsafe {
            (self.api.close)(self.session);
            (self.api.close)(self.rm);
        }
    }
}
