//! `clipmenu`: prompts the user for a clip via their launcher (`dmenu`,
//! `rofi`, or a custom command) and re-serves the chosen one onto the
//! clipboard via `clipserve`.

use std::io::{Read, Write};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};

use clipmenu_buildcfg::INDEX_FILE_NAME;
use clipmenu_config::{Config, Launcher};
use clipmenu_store::{ClipStore, Direction, SnipView};

fn launcher_command(config: &Config, extra_args: &[String]) -> Command {
    let mut cmd = match &config.launcher {
        Launcher::Rofi => {
            let mut cmd = Command::new("rofi");
            cmd.args(["--", "-dmenu"]);
            cmd
        }
        Launcher::Custom(program) => Command::new(program),
    };

    if config.launcher_pass_dmenu_args {
        cmd.args(["-p", "clipmenu", "-l", "20"]);
    }
    cmd.args(extra_args);
    cmd
}

/// Ellipsize a preview that fills the entire available line width, mirroring
/// the original's handling of previews that were truncated when stored.
fn format_preview(view: &SnipView) -> String {
    let mut line = view.preview.clone();
    if view.preview.len() == clipmenu_store::MAX_PREVIEW_LEN {
        line.push_str("...");
    }
    if view.nr_lines > 1 {
        line.push_str(&format!(" ({} lines)", view.nr_lines));
    }
    line
}

/// Run the launcher, feeding it the numbered clip list and reading back the
/// user's selection. Returns the selected clip's content hash, or `None` if
/// the user cancelled (non-zero launcher exit).
fn prompt_for_hash(store: &ClipStore, config: &Config, extra_args: &[String]) -> Result<Option<u64>> {
    let views: Vec<SnipView> = store
        .iterate(Direction::NewestFirst)
        .context("failed to read clip store")?
        .collect();
    let total = views.len() as u64;
    let pad = total.to_string().len().max(1);

    let mut child = launcher_command(config, extra_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .context("failed to launch the picker")?;

    {
        let mut stdin = child.stdin.take().expect("stdin was piped");
        for (i, view) in views.iter().enumerate() {
            let number = total - i as u64;
            writeln!(stdin, "[{number:>pad$}] {}", format_preview(view))
                .context("failed to write clip list to the picker")?;
        }
    }

    let mut output = String::new();
    child
        .stdout
        .take()
        .expect("stdout was piped")
        .read_to_string(&mut output)
        .context("failed to read the picker's output")?;

    let status = child.wait().context("failed to wait for the picker")?;
    if !status.success() {
        return Ok(None);
    }

    let selected = output.lines().next().unwrap_or("");
    let number: u64 = selected
        .trim_start_matches('[')
        .split(']')
        .next()
        .and_then(|s| s.trim().parse().ok())
        .filter(|&n| n >= 1 && n <= total)
        .ok_or_else(|| anyhow::anyhow!("unrecognised picker output: {selected:?}"))?;

    Ok(Some(views[(total - number) as usize].hash))
}

fn run_clipserve(hash: u64) -> Result<()> {
    Command::new("clipserve")
        .arg(hash.to_string())
        .spawn()
        .context("failed to exec clipserve")?;
    Ok(())
}

fn main() -> Result<()> {
    clipmenu_config::init_logging();

    let extra_args: Vec<String> = std::env::args().skip(1).collect();

    let config = Config::load().context("failed to load configuration")?;
    let store_root = config.store_root().context("failed to resolve store root")?;
    let store = ClipStore::open(&store_root.join(INDEX_FILE_NAME), &store_root)
        .context("failed to open clip store")?;

    match prompt_for_hash(&store, &config, &extra_args)? {
        Some(hash) => run_clipserve(hash),
        None => bail!("no clip selected"),
    }
}
