//! Patch catalogue
//!
//! Each patch strips one launcher's remembered login, or locks the desktop
//! down. The set is closed: variants are enumerated here, not discovered.
//! Every variant is idempotent, so re-applying to a clean machine is a
//! no-op rather than an error.

use std::fmt;

use futures::future::join_all;

use drova_core::error::{PatchError, RemoteError};
use drova_core::traits::RemoteShell;
use drova_remote::commands::{GpUpdate, PsExec, RegAdd, RegValue};

use super::PatchContext;

const EXPLORER_POLICIES: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\Policies\Explorer";
const SYSTEM_POLICIES: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\Policies\System";

/// Tools the renter may not start (Explorer `DisallowRun` list)
pub const BLOCKED_APPLICATIONS: &[&str] = &[
    "regedit.exe",
    "powershell.exe",
    "powershell_ise.exe",
    "mmc.exe",
    "gpedit.msc",
    "perfmon.exe",
    "anydesk.exe",
    "rustdesk.exe",
    "ProcessHacker.exe",
    "procexp.exe",
    "autoruns.exe",
    "psexplorer.exe",
    "procexp.exe",
    "procexp64.exe",
    "procexp64a.exe",
    "soundpad.exe",
    "SoundpadService.exe",
];

/// What a patch does to its target
#[derive(Debug, Clone)]
pub enum PatchKind {
    /// Drop whole `[sections]` from an INI file
    StripIniSections {
        path: &'static str,
        sections: &'static [&'static str],
    },
    /// Overwrite a file with fixed contents
    ReplaceContents {
        path: &'static str,
        contents: &'static str,
    },
    /// Delete files that exist
    DeleteFiles { paths: &'static [&'static str] },
    /// Write registry values, refresh policy and restart the shell
    Registry { values: Vec<RegValue> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Changed,
    Unchanged,
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOutcome::Changed => f.write_str("changed"),
            PatchOutcome::Unchanged => f.write_str("already clean"),
        }
    }
}

/// One sanitization step
#[derive(Debug, Clone)]
pub struct Patch {
    pub name: &'static str,
    /// Process image to terminate before patching
    pub kill_image: Option<&'static str>,
    pub kind: PatchKind,
}

impl Patch {
    /// Apply the patch to a fresh copy of its target
    pub async fn apply(
        &self,
        shell: &dyn RemoteShell,
        context: &PatchContext,
    ) -> Result<PatchOutcome, PatchError> {
        match &self.kind {
            PatchKind::StripIniSections { path, sections } => {
                if !shell.exists(path).await? {
                    tracing::debug!("{}: {} not present", self.name, path);
                    return Ok(PatchOutcome::Unchanged);
                }
                let contents = shell.read_file(path).await?;
                match remove_ini_sections(&String::from_utf8_lossy(&contents), sections) {
                    Some(stripped) => {
                        shell.write_file(path, stripped.as_bytes()).await?;
                        Ok(PatchOutcome::Changed)
                    }
                    None => Ok(PatchOutcome::Unchanged),
                }
            }
            PatchKind::ReplaceContents { path, contents } => {
                if !shell.exists(path).await? {
                    tracing::debug!("{}: {} not present", self.name, path);
                    return Ok(PatchOutcome::Unchanged);
                }
                if shell.read_file(path).await? == contents.as_bytes() {
                    return Ok(PatchOutcome::Unchanged);
                }
                shell.write_file(path, contents.as_bytes()).await?;
                Ok(PatchOutcome::Changed)
            }
            PatchKind::DeleteFiles { paths } => {
                let mut outcome = PatchOutcome::Unchanged;
                for path in paths.iter() {
                    if shell.exists(path).await? {
                        tracing::info!("{}: removing {}", self.name, path);
                        shell.remove_file(path).await?;
                        outcome = PatchOutcome::Changed;
                    }
                }
                Ok(outcome)
            }
            PatchKind::Registry { values } => apply_policy(shell, values, context).await,
        }
    }
}

async fn apply_policy(
    shell: &dyn RemoteShell,
    values: &[RegValue],
    context: &PatchContext,
) -> Result<PatchOutcome, PatchError> {
    let results = join_all(values.iter().map(|value| write_value(shell, value))).await;

    let mut failed = 0;
    for (value, result) in values.iter().zip(&results) {
        if let Err(e) = result {
            tracing::warn!("Registry write {}\\{} failed: {}", value.key, value.name, e);
            failed += 1;
        }
    }

    // The shell was terminated before patching, so it is restarted even
    // when some writes failed
    let gpupdate = shell.run(&GpUpdate.to_string()).await?;
    if !gpupdate.success() {
        tracing::warn!("gpupdate exited with {:?}", gpupdate.status);
    }
    tokio::time::sleep(context.policy_settle).await;

    let explorer = PsExec::interactive("explorer.exe")
        .as_user(&context.user, context.password.as_deref())
        .to_string();
    shell.run(&explorer).await?;

    if failed > 0 {
        return Err(PatchError::Registry { failed });
    }
    Ok(PatchOutcome::Changed)
}

async fn write_value(shell: &dyn RemoteShell, value: &RegValue) -> Result<(), RemoteError> {
    shell.run_checked(&RegAdd::Key(&value.key).to_string()).await?;
    shell.run_checked(&RegAdd::Value(value).to_string()).await?;
    Ok(())
}

/// Remove the named sections (header and body) from INI text.
///
/// Returns `None` when none of them were present.
pub fn remove_ini_sections(text: &str, sections: &[&str]) -> Option<String> {
    let mut kept = String::with_capacity(text.len());
    let mut skipping = false;
    let mut removed = false;

    for line in text.split_inclusive('\n') {
        if let Some(name) = section_name(line) {
            skipping = sections.iter().any(|s| *s == name);
            removed |= skipping;
        }
        if !skipping {
            kept.push_str(line);
        }
    }

    removed.then_some(kept)
}

fn section_name(line: &str) -> Option<&str> {
    let line = line.trim_start_matches('\u{feff}').trim();
    line.strip_prefix('[')?.strip_suffix(']').map(str::trim)
}

/// Lockdown values for the renter's desktop
pub fn policy_values() -> Vec<RegValue> {
    let mut values = vec![
        RegValue::dword(r"HKCU\Software\Policies\Microsoft\Windows\System", "DisableCMD", 2),
        RegValue::dword(SYSTEM_POLICIES, "DisableTaskMgr", 1),
        RegValue::dword(r"HKCU\Software\Policies\Microsoft\Windows Script Host", "Enabled", 0),
        RegValue::dword(EXPLORER_POLICIES, "NoClose", 1),
        RegValue::dword(EXPLORER_POLICIES, "StartMenuLogoff", 1),
        RegValue::dword(EXPLORER_POLICIES, "ShutdownWithoutLogon", 0),
        RegValue::dword(EXPLORER_POLICIES, "NoLogoff", 0),
        RegValue::dword(SYSTEM_POLICIES, "DisableGpedit", 1),
        RegValue::dword(
            r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Policies\System",
            "HideFastUserSwitching",
            1,
        ),
        RegValue::dword(r"HKCU\Software\Policies\Microsoft\MMC", "RestrictToPermittedSnapins", 1),
        RegValue::dword(EXPLORER_POLICIES, "DisallowRun", 1),
    ];

    let disallow_run = format!(r"{}\DisallowRun", EXPLORER_POLICIES);
    values.extend(
        BLOCKED_APPLICATIONS
            .iter()
            .enumerate()
            .map(|(index, app)| RegValue::string(disallow_run.as_str(), index.to_string(), *app)),
    );
    values
}

/// Patches applied before every desktop session, in order
pub fn default_patches() -> Vec<Patch> {
    vec![
        Patch {
            name: "epicgames",
            kill_image: Some("EpicGamesLauncher.exe"),
            kind: PatchKind::StripIniSections {
                path: r"AppData\Local\EpicGamesLauncher\Saved\Config\Windows\GameUserSettings.ini",
                sections: &["RememberMe", "Offline"],
            },
        },
        Patch {
            name: "steam",
            kill_image: Some("steam.exe"),
            kind: PatchKind::ReplaceContents {
                path: r"C:\Program Files (x86)\Steam\config\loginusers.vdf",
                contents: "\"users\"\n{\n}",
            },
        },
        Patch {
            name: "ubisoft",
            kill_image: Some("upc.exe"),
            kind: PatchKind::DeleteFiles {
                paths: &[
                    r"AppData\Local\Ubisoft Game Launcher\ConnectSecureStorage.dat",
                    r"AppData\Local\Ubisoft Game Launcher\user.dat",
                ],
            },
        },
        Patch {
            name: "wargaming",
            kill_image: Some("wgc.exe"),
            kind: PatchKind::DeleteFiles {
                paths: &[r"AppData\Roaming\Wargaming.net\GameCenter\user_info.xml"],
            },
        },
        Patch {
            name: "windows-policy",
            kill_image: Some("explorer.exe"),
            kind: PatchKind::Registry {
                values: policy_values(),
            },
        },
    ]
}
