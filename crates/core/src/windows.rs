//! Native Windows HID backend (SetupAPI + hid.dll + kernel32).
//!
//! Enumeration walks the HID device interface class:
//!   1. `HidD_GetHidGuid` → interface class GUID
//!   2. `SetupDiGetClassDevsW(DIGCF_PRESENT | DIGCF_DEVICEINTERFACE)`
//!   3. `SetupDiEnumDeviceInterfaces` by index until `ERROR_NO_MORE_ITEMS`
//!   4. `SetupDiGetDeviceInterfaceDetailW` twice: size query, then fill

use crate::device::{DeviceAttributes, DevicePath};
use crate::error::{Error, Result};
use crate::transport::{HidBackend, HidChannel};
use std::ffi::OsStr;
use std::io;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use tracing::{debug, trace, warn};
use winapi::shared::guiddef::GUID;
use winapi::shared::hidsdi::{HidD_GetAttributes, HidD_GetHidGuid, HidD_SetFeature, HIDD_ATTRIBUTES};
use winapi::shared::minwindef::{DWORD, FALSE};
use winapi::shared::winerror::ERROR_NO_MORE_ITEMS;
use winapi::um::fileapi::{CreateFileW, WriteFile, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::setupapi::{
    SetupDiDestroyDeviceInfoList, SetupDiEnumDeviceInterfaces, SetupDiGetClassDevsW,
    SetupDiGetDeviceInterfaceDetailW, DIGCF_DEVICEINTERFACE, DIGCF_PRESENT, HDEVINFO,
    SP_DEVICE_INTERFACE_DATA, SP_DEVICE_INTERFACE_DETAIL_DATA_W,
};
use winapi::um::winnt::{FILE_SHARE_READ, FILE_SHARE_WRITE, GENERIC_READ, GENERIC_WRITE, HANDLE};

/// SetupAPI/hid.dll backed [`HidBackend`].
#[derive(Debug, Default)]
pub struct WindowsHidBackend;

impl WindowsHidBackend {
    pub fn new() -> Self {
        Self
    }
}

impl HidBackend for WindowsHidBackend {
    fn enumerate_interfaces(&self) -> Result<Vec<DevicePath>> {
        let guid = hid_guid();
        debug!(guid = %format_guid(&guid), "HID interface class");

        let list = DevInfoList::open(&guid)?;
        let mut paths = Vec::new();
        let mut index: DWORD = 0;

        loop {
            // SAFETY: plain-old-data struct; cbSize is set before use.
            let mut iface: SP_DEVICE_INTERFACE_DATA = unsafe { mem::zeroed() };
            iface.cbSize = mem::size_of::<SP_DEVICE_INTERFACE_DATA>() as DWORD;

            // SAFETY: list.0 is a live device info set and iface is correctly sized.
            let ok = unsafe {
                SetupDiEnumDeviceInterfaces(list.0, ptr::null_mut(), &guid, index, &mut iface)
            };
            if ok == FALSE {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(ERROR_NO_MORE_ITEMS as i32) {
                    warn!(index, error = %err, "Interface enumeration ended early");
                }
                break;
            }

            match list.interface_path(&mut iface) {
                Some(path) => paths.push(DevicePath::new(path)),
                None => trace!(index, "Skipping interface with unreadable path"),
            }
            index += 1;
        }

        debug!(count = paths.len(), "HID interface enumeration complete");
        Ok(paths)
    }

    fn query_attributes(&self, path: &DevicePath) -> Result<DeviceAttributes> {
        let handle = OwnedHandle::open(path)?;

        // SAFETY: plain-old-data struct; Size is set before use.
        let mut attrs: HIDD_ATTRIBUTES = unsafe { mem::zeroed() };
        attrs.Size = mem::size_of::<HIDD_ATTRIBUTES>() as u32;

        // SAFETY: handle is open for the duration of the call.
        let ok = unsafe { HidD_GetAttributes(handle.0, &mut attrs) };
        drop(handle);
        if ok == 0 {
            return Err(Error::Hid(format!(
                "HidD_GetAttributes: {}",
                io::Error::last_os_error()
            )));
        }

        trace!(
            vid = format_args!("0x{:04X}", attrs.VendorID),
            pid = format_args!("0x{:04X}", attrs.ProductID),
            "Device attributes"
        );
        Ok(DeviceAttributes {
            vendor_id: attrs.VendorID,
            product_id: attrs.ProductID,
            version: attrs.VersionNumber,
        })
    }

    fn open(&self, path: &DevicePath) -> Result<Box<dyn HidChannel>> {
        let handle = OwnedHandle::open(path)
            .map_err(|e| Error::DeviceOpenFailed(format!("{path}: {e}")))?;
        Ok(Box::new(WindowsHidChannel {
            handle: Some(handle),
        }))
    }
}

/// An open device handle; `CloseHandle` runs exactly once, on drop.
struct OwnedHandle(HANDLE);

// SAFETY: a Windows file handle may be used from any thread; access is
// serialized by the owning channel.
unsafe impl Send for OwnedHandle {}

impl OwnedHandle {
    /// `CreateFileW` for shared read/write access.
    fn open(path: &DevicePath) -> Result<Self> {
        let wide: Vec<u16> = OsStr::new(path.as_str())
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide is NUL-terminated and outlives the call.
        let handle = unsafe {
            CreateFileW(
                wide.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                ptr::null_mut(),
                OPEN_EXISTING,
                0,
                ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(Error::Hid(format!(
                "CreateFileW: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(Self(handle))
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: self.0 came from CreateFileW and is closed only here.
        unsafe {
            CloseHandle(self.0);
        }
    }
}

/// A SetupAPI device information set, destroyed on drop.
struct DevInfoList(HDEVINFO);

impl DevInfoList {
    fn open(guid: &GUID) -> Result<Self> {
        // SAFETY: guid points to a valid GUID for the duration of the call.
        let set = unsafe {
            SetupDiGetClassDevsW(
                guid,
                ptr::null(),
                ptr::null_mut(),
                DIGCF_PRESENT | DIGCF_DEVICEINTERFACE,
            )
        };
        if set == INVALID_HANDLE_VALUE {
            return Err(Error::DeviceEnumeration(format!(
                "SetupDiGetClassDevsW: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(Self(set))
    }

    /// Resolve an interface's device path.
    ///
    /// Two-call contract: the first call passes no buffer and only reports
    /// the required size; the second fills a buffer of that size. Returns
    /// `None` if either step fails.
    fn interface_path(&self, iface: &mut SP_DEVICE_INTERFACE_DATA) -> Option<String> {
        let iface: *mut SP_DEVICE_INTERFACE_DATA = iface;
        let mut required: DWORD = 0;
        // SAFETY: null buffer with size 0 is the documented size query.
        unsafe {
            SetupDiGetDeviceInterfaceDetailW(
                self.0,
                iface,
                ptr::null_mut(),
                0,
                &mut required,
                ptr::null_mut(),
            );
        }
        let header = mem::size_of::<DWORD>();
        if (required as usize) <= header {
            return None;
        }

        // u32 storage keeps the detail struct aligned.
        let mut storage = vec![0u32; (required as usize).div_ceil(4)];
        let detail = storage.as_mut_ptr().cast::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>();

        // SAFETY: storage holds at least `required` bytes and is 4-byte aligned.
        let ok = unsafe {
            (*detail).cbSize = mem::size_of::<SP_DEVICE_INTERFACE_DETAIL_DATA_W>() as DWORD;
            SetupDiGetDeviceInterfaceDetailW(
                self.0,
                iface,
                detail,
                required,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        if ok == FALSE {
            trace!(error = %io::Error::last_os_error(), "SetupDiGetDeviceInterfaceDetailW");
            return None;
        }

        let max_chars = (required as usize - header) / 2;
        // SAFETY: DevicePath starts right after cbSize and the buffer holds
        // `max_chars` UTF-16 units past that point.
        let wide = unsafe {
            let first = ptr::addr_of!((*detail).DevicePath).cast::<u16>();
            std::slice::from_raw_parts(first, max_chars)
        };
        let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
        Some(String::from_utf16_lossy(&wide[..len]))
    }
}

impl Drop for DevInfoList {
    fn drop(&mut self) {
        // SAFETY: self.0 came from SetupDiGetClassDevsW and is destroyed only here.
        unsafe {
            SetupDiDestroyDeviceInfoList(self.0);
        }
    }
}

/// Open channel to the control interface.
pub struct WindowsHidChannel {
    handle: Option<OwnedHandle>,
}

impl WindowsHidChannel {
    fn raw(&self) -> Result<HANDLE> {
        self.handle
            .as_ref()
            .map(|h| h.0)
            .ok_or(Error::NotConnected)
    }
}

impl HidChannel for WindowsHidChannel {
    fn send_feature_report(&mut self, data: &[u8]) -> Result<()> {
        let handle = self.raw()?;
        let mut buf = data.to_vec();
        // SAFETY: buf is valid for buf.len() bytes and the handle is open.
        let ok = unsafe { HidD_SetFeature(handle, buf.as_mut_ptr().cast(), buf.len() as u32) };
        if ok == 0 {
            return Err(Error::Hid(format!(
                "HidD_SetFeature: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    fn write_output_report(&mut self, data: &[u8]) -> Result<usize> {
        let handle = self.raw()?;
        let mut written: DWORD = 0;
        // SAFETY: data is valid for data.len() bytes; synchronous write, no OVERLAPPED.
        let ok = unsafe {
            WriteFile(
                handle,
                data.as_ptr().cast(),
                data.len() as DWORD,
                &mut written,
                ptr::null_mut(),
            )
        };
        if ok == FALSE {
            return Err(Error::Hid(format!(
                "WriteFile: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(written as usize)
    }

    fn close(&mut self) {
        if self.handle.take().is_some() {
            debug!("Device handle closed");
        }
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

fn hid_guid() -> GUID {
    // SAFETY: plain-old-data out parameter.
    let mut guid: GUID = unsafe { mem::zeroed() };
    // SAFETY: guid is a valid, writable GUID.
    unsafe { HidD_GetHidGuid(&mut guid) };
    guid
}

fn format_guid(g: &GUID) -> String {
    format!(
        "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
        g.Data1,
        g.Data2,
        g.Data3,
        g.Data4[0],
        g.Data4[1],
        g.Data4[2],
        g.Data4[3],
        g.Data4[4],
        g.Data4[5],
        g.Data4[6],
        g.Data4[7]
    )
}
