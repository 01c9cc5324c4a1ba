//! `clipdel`: prints (and, with `-d`, deletes) every stored clip whose
//! preview matches a regex. Without `-d` it's a dry run: matches are
//! printed but nothing is removed.

use anyhow::{bail, Context, Result};
use regex::Regex;

use clipmenu_buildcfg::INDEX_FILE_NAME;
use clipmenu_config::Config;
use clipmenu_store::{ClipStore, Direction, RemoveAction, SnipView};

struct Args {
    delete: bool,
    invert_match: bool,
    pattern: String,
}

fn parse_args() -> Result<Args> {
    let mut delete = false;
    let mut invert_match = false;
    let mut pattern = None;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-d" => delete = true,
            "-v" => invert_match = true,
            _ if pattern.is_none() => pattern = Some(arg),
            other => bail!("unexpected argument: {other}"),
        }
    }

    let pattern = pattern.context("usage: clipdel [-d] [-v] regex")?;
    Ok(Args {
        delete,
        invert_match,
        pattern,
    })
}

fn should_delete(view: &SnipView, rgx: &Regex, invert_match: bool) -> bool {
    let matched = rgx.is_match(&view.preview);
    if invert_match {
        !matched
    } else {
        matched
    }
}

fn main() -> Result<()> {
    clipmenu_config::init_logging();

    let args = parse_args()?;
    let rgx = Regex::new(&args.pattern).context("could not compile regex")?;

    let config = Config::load().context("failed to load configuration")?;
    let store_root = config.store_root().context("failed to resolve store root")?;
    let store = ClipStore::open(&store_root.join(INDEX_FILE_NAME), &store_root)
        .context("failed to open clip store")?;

    let removed = store.remove(Direction::OldestFirst, |view| {
        let wants_del = should_delete(view, &rgx, args.invert_match);
        if wants_del {
            println!("{}", view.preview);
        }
        if args.delete && wants_del {
            RemoveAction::REMOVE
        } else {
            RemoveAction::KEEP
        }
    })?;

    if args.delete {
        log::info!("removed {removed} clip(s)");
    }

    Ok(())
}
