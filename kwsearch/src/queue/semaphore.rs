use std::ffi::CString;
use std::io;

use tracing::trace;

use crate::errors::{KwError, KwResult};

/// POSIX named semaphore shared between the server and its clients
#[derive(Debug)]
pub struct NamedSemaphore {
    sem: *mut libc::sem_t,
    name: String,
}

// sem_t operations are process-shared and thread-safe by definition.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    /// Creates `name` with `initial` permits, replacing any stale semaphore
    /// a previous run left behind.
    pub fn create(name: &str, initial: u32) -> KwResult<Self> {
        let c_name = Self::c_name(name)?;
        unsafe {
            libc::sem_unlink(c_name.as_ptr());
        }
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o666 as libc::c_uint,
                initial as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(KwError::semaphore(name));
        }
        trace!("Created semaphore {} with {} permits", name, initial);
        Ok(Self {
            sem,
            name: name.to_string(),
        })
    }

    /// Opens a semaphore the server already created.
    pub fn open(name: &str) -> KwResult<Self> {
        let c_name = Self::c_name(name)?;
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(KwError::semaphore(name));
        }
        trace!("Opened semaphore {}", name);
        Ok(Self {
            sem,
            name: name.to_string(),
        })
    }

    /// Removes the name; processes that still hold it keep a working handle.
    pub fn unlink(name: &str) -> KwResult<()> {
        let c_name = Self::c_name(name)?;
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } != 0 {
            return Err(KwError::semaphore(name));
        }
        Ok(())
    }

    /// Blocks until a permit is available.
    pub fn wait(&self) -> KwResult<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(KwError::Semaphore {
                    name: self.name.clone(),
                    source: err,
                });
            }
        }
    }

    pub fn post(&self) -> KwResult<()> {
        if unsafe { libc::sem_post(self.sem) } != 0 {
            return Err(KwError::semaphore(self.name.clone()));
        }
        Ok(())
    }

    fn c_name(name: &str) -> KwResult<CString> {
        if !name.starts_with('/') || name[1..].contains('/') {
            return Err(KwError::config_error(format!(
                "semaphore name {:?} must be a single leading-slash component",
                name
            )));
        }
        CString::new(name)
            .map_err(|_| KwError::config_error(format!("semaphore name {:?} contains NUL", name)))
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}
