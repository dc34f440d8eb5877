//! Process control commands

use std::fmt;

use super::quote;

/// `taskkill.exe` by image name
#[derive(Debug, Clone)]
pub struct TaskKill<'a> {
    pub image: &'a str,
    pub force: bool,
}

impl<'a> TaskKill<'a> {
    /// Forcefully terminate every process running `image`
    pub fn force(image: &'a str) -> Self {
        Self { image, force: true }
    }
}

impl fmt::Display for TaskKill<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("taskkill.exe")?;
        if self.force {
            f.write_str(" /f")?;
        }
        write!(f, " /IM {}", quote(self.image))
    }
}

/// Sysinternals `psexec`, used to start programs in the interactive desktop
/// session rather than the SSH service session
#[derive(Debug, Clone)]
pub struct PsExec<'a> {
    /// Interactive session id (`-i`)
    pub interactive: Option<u32>,
    pub accept_eula: bool,
    /// Don't wait for the program to exit (`-d`)
    pub detach: bool,
    pub user: Option<&'a str>,
    pub password: Option<&'a str>,
    pub command: &'a str,
}

impl<'a> PsExec<'a> {
    /// Launch `command` detached on the console session
    pub fn interactive(command: &'a str) -> Self {
        Self {
            interactive: Some(1),
            accept_eula: true,
            detach: true,
            user: None,
            password: None,
            command,
        }
    }

    /// Run as the given account
    pub fn as_user(mut self, user: &'a str, password: Option<&'a str>) -> Self {
        self.user = Some(user);
        self.password = password;
        self
    }
}

impl fmt::Display for PsExec<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("psexec")?;
        if let Some(session) = self.interactive {
            write!(f, " -i {}", session)?;
        }
        if self.accept_eula {
            f.write_str(" -accepteula")?;
        }
        if self.detach {
            f.write_str(" -d")?;
        }
        if let Some(user) = self.user {
            write!(f, " -u {}", quote(user))?;
        }
        if let Some(password) = self.password {
            write!(f, " -p {}", quote(password))?;
        }
        write!(f, " {}", quote(self.command))
    }
}

/// Refresh user group policy
#[derive(Debug, Clone, Copy, Default)]
pub struct GpUpdate;

impl fmt::Display for GpUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("gpupdate /target:user /force")
    }
}

/// Immediate forced restart
#[derive(Debug, Clone, Copy, Default)]
pub struct Reboot;

impl fmt::Display for Reboot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("shutdown /r /f /t 0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taskkill() {
        assert_eq!(
            TaskKill::force("EpicGamesLauncher.exe").to_string(),
            "taskkill.exe /f /IM EpicGamesLauncher.exe"
        );
        let gentle = TaskKill {
            image: "steam.exe",
            force: false,
        };
        assert_eq!(gentle.to_string(), "taskkill.exe /IM steam.exe");
    }

    #[test]
    fn test_psexec() {
        assert_eq!(
            PsExec::interactive("explorer.exe").to_string(),
            "psexec -i 1 -accepteula -d explorer.exe"
        );
        assert_eq!(
            PsExec::interactive("explorer.exe")
                .as_user("gamer", Some("p w"))
                .to_string(),
            r#"psexec -i 1 -accepteula -d -u gamer -p "p w" explorer.exe"#
        );
    }
}
