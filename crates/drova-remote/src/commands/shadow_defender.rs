//! Shadow Defender command-line tool (frozen-disk mode)

use std::fmt;

use drova_core::config::ShadowDefenderConfig;

use super::quote;

/// Actions understood by `CmdTool.exe`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowAction {
    /// Start discarding writes on the configured drives
    Enter,
    /// Stop discarding writes on the configured drives
    Exit,
    /// Restart the machine
    Reboot,
    /// Print protection status (used to check the password)
    List,
}

#[derive(Debug, Clone)]
pub struct ShadowDefenderCli<'a> {
    config: &'a ShadowDefenderConfig,
    actions: Vec<ShadowAction>,
}

impl<'a> ShadowDefenderCli<'a> {
    pub fn new(config: &'a ShadowDefenderConfig, actions: &[ShadowAction]) -> Self {
        Self {
            config,
            actions: actions.to_vec(),
        }
    }
}

impl fmt::Display for ShadowDefenderCli<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} /pwd:\"{}\"",
            quote(&self.config.executable),
            self.config.password
        )?;
        for action in &self.actions {
            match action {
                ShadowAction::Enter => write!(f, " /enter:{}", self.config.drives)?,
                ShadowAction::Exit => write!(f, " /exit:{}", self.config.drives)?,
                ShadowAction::Reboot => f.write_str(" /reboot")?,
                ShadowAction::List => f.write_str(" /list")?,
            }
        }
        f.write_str(" /now")
    }
}
