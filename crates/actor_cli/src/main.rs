use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use actor_core::archive::MemoryArchive;
use actor_core::byml::{self, Byml};
use actor_core::copy::MapResolver;
use actor_core::core_api::{ChangeReport, Engine, Session};
use actor_core::flag::FlagKind;
use actor_core::overrides::OverrideRuleSet;
use actor_core::reader::Endian;
use actor_render::{
    JsonStyle, TextRenderOptions, TextStyle, render_json_flags, render_json_report,
    render_text_flags, render_text_report,
};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Write pages and documents big endian (Wii U) instead of the detected order
    #[arg(long = "big-endian", global = true)]
    big_endian: bool,
    /// Override rule table (JSON) used instead of the built-in one
    #[arg(long, value_name = "PATH", global = true)]
    rules: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List flags whose name contains NEEDLE
    Flags {
        dir: PathBuf,
        needle: String,
        #[arg(long, value_name = "bool_data|s32_data|...", value_parser = parse_category)]
        category: Option<FlagKind>,
    },
    /// Rename an actor and regenerate its flags
    Rename {
        dir: PathBuf,
        old: String,
        new: String,
        /// Give the actor a far variant
        #[arg(long)]
        far: bool,
    },
    /// Copy an actor under a new name
    Copy {
        dir: PathBuf,
        source: String,
        target: String,
        /// Give the copy its own file for this link
        #[arg(long = "force", value_name = "LINK")]
        force: Vec<String>,
        /// JSON table of unmodified link references, `{actor: {link: ref}}`
        #[arg(long, value_name = "PATH")]
        vanilla: Option<PathBuf>,
        #[arg(long, value_name = "NAME")]
        bfres: Option<String>,
    },
    /// Regenerate revival flags for placed map objects
    Revival {
        dir: PathBuf,
        #[arg(value_name = "MAP_DOC", required = true)]
        maps: Vec<PathBuf>,
        /// Directory holding the unmodified map documents under the same file names
        #[arg(long, value_name = "DIR")]
        stock: Option<PathBuf>,
    },
}

fn parse_category(value: &str) -> Result<FlagKind, String> {
    FlagKind::from_category(value).ok_or_else(|| {
        let known: Vec<&str> = FlagKind::ALL.iter().map(FlagKind::category).collect();
        format!("unknown category '{value}', expected one of {}", known.join(", "))
    })
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "botw_actor=info,actor_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("{context}");
    eprintln!("  {err}");
    process::exit(1);
}

fn open_session(cli: &Cli, dir: &Path) -> Session {
    let rules = match &cli.rules {
        Some(path) => OverrideRuleSet::from_path(path).unwrap_or_else(|e| {
            fail(&format!("Error reading rules {}", path.display()), e)
        }),
        None => OverrideRuleSet::standard()
            .unwrap_or_else(|e| fail("Error reading the built-in rule table", e)),
    };
    let archive = MemoryArchive::load_dir(dir)
        .unwrap_or_else(|e| fail(&format!("Error reading {}", dir.display()), e));
    let mut session = Engine::with_rules(rules)
        .open(archive)
        .unwrap_or_else(|e| fail(&format!("Error opening {}", dir.display()), e));
    if cli.big_endian {
        session.set_endian(Endian::Big);
    }
    session
}

fn save_session(mut session: Session, dir: &Path) -> ChangeReport {
    let report = session
        .save()
        .unwrap_or_else(|e| fail("Error staging changes", e));
    session
        .into_archive()
        .write_dir(dir)
        .unwrap_or_else(|e| fail(&format!("Error writing {}", dir.display()), e));
    info!(dir = %dir.display(), "wrote changes");
    report
}

fn read_map(path: &Path) -> Byml {
    let bytes =
        fs::read(path).unwrap_or_else(|e| fail(&format!("Error reading {}", path.display()), e));
    byml::from_binary(&bytes)
        .unwrap_or_else(|e| fail(&format!("Error parsing map {}", path.display()), e))
}

fn print_report(cli: &Cli, report: &ChangeReport) {
    if cli.json {
        let value = render_json_report(report, JsonStyle::CanonicalV1);
        match serde_json::to_string_pretty(&value) {
            Ok(text) => println!("{text}"),
            Err(e) => fail("Error encoding report", e),
        }
    } else {
        print!(
            "{}",
            render_text_report(
                report,
                TextStyle::Summary,
                TextRenderOptions {
                    verbose: cli.verbose
                }
            )
        );
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    match &cli.command {
        Command::Flags {
            dir,
            needle,
            category,
        } => {
            let session = open_session(&cli, dir);
            let flags = session.search_flags(needle, *category);
            if cli.json {
                let value = render_json_flags(&flags, JsonStyle::CanonicalV1);
                match serde_json::to_string_pretty(&value) {
                    Ok(text) => println!("{text}"),
                    Err(e) => fail("Error encoding flags", e),
                }
            } else {
                print!("{}", render_text_flags(&flags, TextStyle::Summary));
            }
        }
        Command::Rename { dir, old, new, far } => {
            let mut session = open_session(&cli, dir);
            if *far {
                session
                    .set_actor_has_far(old, true)
                    .unwrap_or_else(|e| fail(&format!("Error adding far variant to {old}"), e));
            }
            session
                .rename_actor(old, new)
                .unwrap_or_else(|e| fail(&format!("Error renaming {old} to {new}"), e));
            let report = save_session(session, dir);
            print_report(&cli, &report);
        }
        Command::Copy {
            dir,
            source,
            target,
            force,
            vanilla,
            bfres,
        } => {
            let resolver = match vanilla {
                Some(path) => MapResolver::from_path(path).unwrap_or_else(|e| {
                    fail(&format!("Error reading vanilla table {}", path.display()), e)
                }),
                None => MapResolver::new(),
            };
            let force: BTreeSet<String> = force.iter().cloned().collect();
            let mut session = open_session(&cli, dir);
            session
                .copy_actor(source, target, &force, &resolver, bfres.as_deref())
                .unwrap_or_else(|e| fail(&format!("Error copying {source} to {target}"), e));
            let report = save_session(session, dir);
            print_report(&cli, &report);
        }
        Command::Revival { dir, maps, stock } => {
            let mut session = open_session(&cli, dir);
            for map_path in maps {
                let map = read_map(map_path);
                let stock_map = stock
                    .as_ref()
                    .zip(map_path.file_name())
                    .map(|(stock_dir, file)| stock_dir.join(file))
                    .filter(|path| path.is_file())
                    .map(|path| read_map(&path));
                debug!(map = %map_path.display(), stock = stock_map.is_some(), "reviving map");
                session
                    .generate_revival(&map, stock_map.as_ref())
                    .unwrap_or_else(|e| {
                        fail(&format!("Error generating flags for {}", map_path.display()), e)
                    });
            }
            let report = save_session(session, dir);
            print_report(&cli, &report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parser_accepts_page_keys() {
        assert_eq!(parse_category("s32_data"), Ok(FlagKind::S32));
        assert!(parse_category("s33_data").is_err());
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "botw-actor",
            "copy",
            "mod",
            "Item_Apple",
            "Item_Pear",
            "--force",
            "ModelUser",
            "--force",
            "PhysicsUser",
            "--json",
        ])
        .expect("arguments should parse");
        assert!(cli.json);
        match cli.command {
            Command::Copy { force, .. } => assert_eq!(force, vec!["ModelUser", "PhysicsUser"]),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
