//! OS account lookups for running game servers under their own user.

use std::io;
use std::path::PathBuf;

use gameap_core::ExecutorOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemUser {
    pub name: String,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub home_dir: Option<PathBuf>,
}

impl SystemUser {
    /// Options running a command as this user inside `work_dir`, falling back to the home dir.
    pub fn executor_options(&self, work_dir: PathBuf) -> ExecutorOptions {
        ExecutorOptions {
            work_dir,
            fallback_work_dir: self.home_dir.clone(),
            uid: self.uid,
            gid: self.gid,
            username: self.name.clone(),
            home_dir: self.home_dir.clone(),
            ..Default::default()
        }
    }
}

/// `Ok(None)` when the account does not exist.
#[cfg(unix)]
pub fn lookup_user(name: &str) -> io::Result<Option<SystemUser>> {
    let user = nix::unistd::User::from_name(name).map_err(io::Error::from)?;

    Ok(user.map(|u| SystemUser {
        name: u.name,
        uid: Some(u.uid.as_raw()),
        gid: Some(u.gid.as_raw()),
        home_dir: Some(u.dir),
    }))
}

/// Accounts are resolved by the service manager on this platform.
#[cfg(not(unix))]
pub fn lookup_user(name: &str) -> io::Result<Option<SystemUser>> {
    Ok(Some(SystemUser {
        name: name.to_string(),
        uid: None,
        gid: None,
        home_dir: None,
    }))
}

#[cfg(unix)]
pub fn current_user() -> io::Result<Option<SystemUser>> {
    let uid = nix::unistd::getuid();
    let user = nix::unistd::User::from_uid(uid).map_err(io::Error::from)?;

    Ok(user.map(|u| SystemUser {
        name: u.name,
        uid: Some(u.uid.as_raw()),
        gid: Some(u.gid.as_raw()),
        home_dir: Some(u.dir),
    }))
}

#[cfg(not(unix))]
pub fn current_user() -> io::Result<Option<SystemUser>> {
    Ok(None)
}
