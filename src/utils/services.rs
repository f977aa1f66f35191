// src/utils/services.rs

use std::time::Duration;

use strum_macros::{AsRefStr, Display, EnumString};

use crate::errors::ServiceError;

/// Run state of a service as reported by the Service Control Manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ServiceState {
    Unknown,
    Running,
    Stopped,
    StartPending,
    StopPending,
    Paused,
}

/// Startup type of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum StartupType {
    #[strum(serialize = "boot")]
    Boot,
    #[strum(serialize = "system")]
    System,
    #[strum(to_string = "auto", serialize = "automatic")]
    Automatic,
    #[strum(to_string = "delayed-auto", serialize = "delayed")]
    AutomaticDelayed,
    #[strum(to_string = "manual", serialize = "demand")]
    Manual,
    #[strum(serialize = "disabled")]
    Disabled,
}

impl StartupType {
    /// Argument accepted by `sc.exe config <name> start= <arg>`.
    pub fn sc_arg(self) -> &'static str {
        match self {
            StartupType::Boot => "boot",
            StartupType::System => "system",
            StartupType::Automatic => "auto",
            StartupType::AutomaticDelayed => "delayed-auto",
            StartupType::Manual => "demand",
            StartupType::Disabled => "disabled",
        }
    }

    pub fn is_automatic(self) -> bool {
        matches!(self, StartupType::Automatic | StartupType::AutomaticDelayed)
    }
}

/// Control over OS services.
pub trait ServiceControl: Send + Sync {
    fn exists(&self, name: &str) -> Result<bool, ServiceError>;

    fn status(&self, name: &str) -> Result<ServiceState, ServiceError>;

    fn startup_type(&self, name: &str) -> Result<StartupType, ServiceError>;

    fn set_startup_type(&self, name: &str, startup_type: StartupType) -> Result<(), ServiceError>;

    /// Requests a stop and waits up to `timeout` for the service to report Stopped.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` if the service is stopped (or already was).
    /// - `Ok(false)` if it was still running when the timeout elapsed.
    /// - `Err(ServiceError)` if the stop request itself failed.
    fn stop(&self, name: &str, timeout: Duration) -> Result<bool, ServiceError>;

    /// Kills the process hosting the service.
    fn force_stop(&self, name: &str) -> Result<(), ServiceError>;

    fn start(&self, name: &str) -> Result<(), ServiceError>;
}

/// Extracts the startup type from `sc.exe qc <name>` output.
///
/// The relevant line looks like `START_TYPE : 2   AUTO_START  (DELAYED)`; the numeric
/// code is used so localized output still parses.
pub fn parse_sc_start_type(output: &str) -> Option<StartupType> {
    let line = output.lines().find(|line| line.contains("START_TYPE"))?;
    let (_, rest) = line.split_once(':')?;
    let code: u32 = rest.split_whitespace().next()?.parse().ok()?;
    match code {
        0 => Some(StartupType::Boot),
        1 => Some(StartupType::System),
        2 if rest.contains("DELAYED") => Some(StartupType::AutomaticDelayed),
        2 => Some(StartupType::Automatic),
        3 => Some(StartupType::Manual),
        4 => Some(StartupType::Disabled),
        _ => None,
    }
}

#[cfg(windows)]
mod win {
    use std::{
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };

    use widestring::U16CString;
    use windows::{
        core::{HRESULT, PCWSTR},
        Win32::{
            Foundation::{
                ERROR_SERVICE_ALREADY_RUNNING, ERROR_SERVICE_DOES_NOT_EXIST,
                ERROR_SERVICE_NOT_ACTIVE,
            },
            System::Services::{
                CloseServiceHandle, ControlService, OpenSCManagerW, OpenServiceW,
                QueryServiceStatus, StartServiceW, SC_HANDLE, SC_MANAGER_CONNECT,
                SERVICE_CONTROL_STOP, SERVICE_PAUSED, SERVICE_QUERY_STATUS, SERVICE_RUNNING,
                SERVICE_START, SERVICE_START_PENDING, SERVICE_STATUS, SERVICE_STOP,
                SERVICE_STOPPED, SERVICE_STOP_PENDING,
            },
        },
    };

    use super::{parse_sc_start_type, ServiceControl, ServiceState, StartupType};
    use crate::{errors::ServiceError, utils::command::CommandRunner};

    const SC_TIMEOUT: Duration = Duration::from_secs(30);
    const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

    /// Closes the wrapped SCM handle on drop.
    struct ScHandle(SC_HANDLE);

    impl Drop for ScHandle {
        fn drop(&mut self) {
            if let Err(e) = unsafe { CloseServiceHandle(self.0) } {
                tracing::error!("Failed to close service handle: {:?}", e);
            }
        }
    }

    /// Services managed through the Service Control Manager, with `sc.exe` for startup
    /// configuration and `taskkill` as the forceful stop.
    pub struct WindowsServices {
        runner: Arc<dyn CommandRunner>,
    }

    impl WindowsServices {
        pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
            Self { runner }
        }

        fn open_manager() -> Result<ScHandle, ServiceError> {
            let handle =
                unsafe { OpenSCManagerW(PCWSTR::null(), PCWSTR::null(), SC_MANAGER_CONNECT) }
                    .map_err(|e| ServiceError::ManagerOpenError(e.to_string()))?;
            Ok(ScHandle(handle))
        }

        fn open_service(name: &str, access: u32) -> Result<(ScHandle, ScHandle), ServiceError> {
            let manager = Self::open_manager()?;
            let wide = U16CString::from_str(name).map_err(|e| ServiceError::QueryError {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            match unsafe { OpenServiceW(manager.0, PCWSTR::from_raw(wide.as_ptr()), access) } {
                Ok(handle) => Ok((manager, ScHandle(handle))),
                Err(e) if e.code() == HRESULT::from_win32(ERROR_SERVICE_DOES_NOT_EXIST.0) => {
                    Err(ServiceError::NotFound(name.to_string()))
                }
                Err(e) => Err(ServiceError::QueryError {
                    name: name.to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        fn query(service: &ScHandle, name: &str) -> Result<ServiceState, ServiceError> {
            let mut status = SERVICE_STATUS::default();
            unsafe { QueryServiceStatus(service.0, &mut status) }.map_err(|e| {
                ServiceError::QueryError {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            })?;
            let state = status.dwCurrentState;
            Ok(if state == SERVICE_RUNNING {
                ServiceState::Running
            } else if state == SERVICE_STOPPED {
                ServiceState::Stopped
            } else if state == SERVICE_START_PENDING {
                ServiceState::StartPending
            } else if state == SERVICE_STOP_PENDING {
                ServiceState::StopPending
            } else if state == SERVICE_PAUSED {
                ServiceState::Paused
            } else {
                ServiceState::Unknown
            })
        }

        fn run_tool(
            &self,
            name: &str,
            program: &str,
            args: &[&str],
        ) -> Result<String, ServiceError> {
            let output = self
                .runner
                .run(program, args, Some(SC_TIMEOUT))
                .map_err(|e| ServiceError::ConfigError {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
            if !output.success() {
                return Err(ServiceError::ConfigError {
                    name: name.to_string(),
                    reason: format!(
                        "{} exited with {:?}: {}",
                        program,
                        output.exit_code,
                        output.stdout.trim()
                    ),
                });
            }
            Ok(output.stdout)
        }
    }

    impl ServiceControl for WindowsServices {
        fn exists(&self, name: &str) -> Result<bool, ServiceError> {
            match Self::open_service(name, SERVICE_QUERY_STATUS) {
                Ok(_) => Ok(true),
                Err(ServiceError::NotFound(_)) => Ok(false),
                Err(e) => Err(e),
            }
        }

        fn status(&self, name: &str) -> Result<ServiceState, ServiceError> {
            let (_manager, service) = Self::open_service(name, SERVICE_QUERY_STATUS)?;
            Self::query(&service, name)
        }

        fn startup_type(&self, name: &str) -> Result<StartupType, ServiceError> {
            let stdout = self.run_tool(name, "sc.exe", &["qc", name])?;
            parse_sc_start_type(&stdout).ok_or_else(|| ServiceError::QueryError {
                name: name.to_string(),
                reason: "START_TYPE missing from sc.exe output".to_string(),
            })
        }

        fn set_startup_type(
            &self,
            name: &str,
            startup_type: StartupType,
        ) -> Result<(), ServiceError> {
            self.run_tool(
                name,
                "sc.exe",
                &["config", name, "start=", startup_type.sc_arg()],
            )
            .map(|_| ())
        }

        fn stop(&self, name: &str, timeout: Duration) -> Result<bool, ServiceError> {
            let (_manager, service) =
                Self::open_service(name, SERVICE_STOP | SERVICE_QUERY_STATUS)?;
            if Self::query(&service, name)? == ServiceState::Stopped {
                return Ok(true);
            }

            let mut status = SERVICE_STATUS::default();
            if let Err(e) = unsafe { ControlService(service.0, SERVICE_CONTROL_STOP, &mut status) }
            {
                if e.code() != HRESULT::from_win32(ERROR_SERVICE_NOT_ACTIVE.0) {
                    return Err(ServiceError::ControlError {
                        name: name.to_string(),
                        reason: e.to_string(),
                    });
                }
            }

            let deadline = Instant::now() + timeout;
            loop {
                if Self::query(&service, name)? == ServiceState::Stopped {
                    return Ok(true);
                }
                if Instant::now() >= deadline {
                    return Ok(false);
                }
                thread::sleep(STOP_POLL_INTERVAL);
            }
        }

        fn force_stop(&self, name: &str) -> Result<(), ServiceError> {
            let filter = format!("SERVICES eq {}", name);
            self.run_tool(name, "taskkill.exe", &["/F", "/FI", &filter])
                .map(|_| ())
        }

        fn start(&self, name: &str) -> Result<(), ServiceError> {
            let (_manager, service) = Self::open_service(name, SERVICE_START)?;
            match unsafe { StartServiceW(service.0, None) } {
                Ok(()) => Ok(()),
                Err(e) if e.code() == HRESULT::from_win32(ERROR_SERVICE_ALREADY_RUNNING.0) => {
                    Ok(())
                }
                Err(e) => Err(ServiceError::ControlError {
                    name: name.to_string(),
                    reason: e.to_string(),
                }),
            }
        }
    }
}

#[cfg(windows)]
pub use win::WindowsServices;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sc_start_type() {
        let output = "\
[SC] QueryServiceConfig SUCCESS

SERVICE_NAME: SysMain
        TYPE               : 20  WIN32_SHARE_PROCESS
        START_TYPE         : 2   AUTO_START
        ERROR_CONTROL      : 1   NORMAL";
        assert_eq!(parse_sc_start_type(output), Some(StartupType::Automatic));

        let delayed = "        START_TYPE         : 2   AUTO_START  (DELAYED)";
        assert_eq!(
            parse_sc_start_type(delayed),
            Some(StartupType::AutomaticDelayed)
        );

        let disabled = "        START_TYPE         : 4   DISABLED";
        assert_eq!(parse_sc_start_type(disabled), Some(StartupType::Disabled));

        assert_eq!(parse_sc_start_type("garbage"), None);
    }

    #[test]
    fn test_startup_type_names() {
        assert_eq!(StartupType::Manual.sc_arg(), "demand");
        assert_eq!("demand".parse::<StartupType>().ok(), Some(StartupType::Manual));
        assert_eq!("Manual".parse::<StartupType>().ok(), Some(StartupType::Manual));
        assert_eq!(
            "delayed-auto".parse::<StartupType>().ok(),
            Some(StartupType::AutomaticDelayed)
        );
        assert_eq!(StartupType::Automatic.to_string(), "auto");
    }
}
