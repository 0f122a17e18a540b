//! Windows service control using Service Control Manager (SCM) API

use anyhow::{Context, Result};
use std::mem;
use windows::Win32::System::Services::{
    CloseServiceHandle, OpenSCManagerW, OpenServiceW, QueryServiceStatusEx, SC_HANDLE,
    SC_MANAGER_CONNECT, SC_STATUS_PROCESS_INFO, SERVICE_QUERY_STATUS, SERVICE_RUNNING,
    SERVICE_START, SERVICE_STATUS_PROCESS, StartServiceW,
};
use windows::core::PCWSTR;

/// RAII wrapper for SC_HANDLE (Service Control Manager or service handle)
struct ScHandle(SC_HANDLE);

impl ScHandle {
    fn manager() -> Result<Self> {
        let handle = unsafe { OpenSCManagerW(PCWSTR::null(), PCWSTR::null(), SC_MANAGER_CONNECT) }
            .context("Failed to open Service Control Manager")?;
        Ok(ScHandle(handle))
    }

    fn service(&self, name: &str, access: u32) -> Result<Self> {
        let wide: Vec<u16> = name.encode_utf16().chain(Some(0)).collect();
        let handle = unsafe { OpenServiceW(self.0, PCWSTR(wide.as_ptr()), access) }
            .with_context(|| format!("Failed to open service: {name}"))?;
        Ok(ScHandle(handle))
    }
}

impl Drop for ScHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseServiceHandle(self.0);
            }
        }
    }
}

/// Check if a service is running via QueryServiceStatusEx
///
/// Returns: Ok(true) if the service is running, Ok(false) otherwise
pub fn is_running(name: &str) -> Result<bool> {
    let sc_manager = ScHandle::manager()?;
    let service = sc_manager.service(name, SERVICE_QUERY_STATUS)?;

    let mut status: SERVICE_STATUS_PROCESS = unsafe { mem::zeroed() };
    let mut bytes_needed: u32 = 0;

    unsafe {
        QueryServiceStatusEx(
            service.0,
            SC_STATUS_PROCESS_INFO,
            Some(std::slice::from_raw_parts_mut(
                &mut status as *mut _ as *mut u8,
                mem::size_of::<SERVICE_STATUS_PROCESS>(),
            )),
            &mut bytes_needed,
        )
    }
    .context("Failed to query service status")?;

    Ok(status.dwCurrentState == SERVICE_RUNNING)
}

/// Start a service via StartServiceW
pub fn start_service(name: &str) -> Result<()> {
    let sc_manager = ScHandle::manager()?;
    let service = sc_manager.service(name, SERVICE_START)?;

    unsafe { StartServiceW(service.0, None) }.context("Failed to start service")?;

    Ok(())
}
