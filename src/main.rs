mod cli;
mod config;
mod domain;
mod error;
mod infra;
mod workflows;

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Command, TagAction};
use config::Config;
use domain::models::Show;
use infra::covers::CoverCache;
use infra::listing::index_files;
use infra::metadata::TvMazeClient;
use infra::store::ShowStore;
use workflows::filters::FilterGroups;
use workflows::library::Library;
use workflows::reconcile::watched_path_for;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let library = open_library(&config)?;
    let today = Local::now().date_naive();

    match cli.command {
        Command::Import => {
            let created = library.import(&index_files(&config.binaries_pattern)?)?;
            println!("Imported {created} new show(s)");
        }
        Command::Fetch { all } => {
            let names = library.names();
            let ids = library.fetch_ids(&names)?;
            let summaries = library.fetch_summaries(&names, all)?;
            println!(
                "Found {} id(s), refreshed {} show(s), skipped {}",
                ids.refreshed, summaries.refreshed, summaries.skipped
            );
            print_failures(ids.failed.iter().chain(&summaries.failed));
        }
        Command::Scan { show } => {
            let names = match show {
                Some(name) => vec![name],
                None => library.names(),
            };
            let (report, totals) = library.scan(&names, &index_files(&config.binaries_pattern)?)?;
            println!(
                "Matched {} file(s), {} extra(s), {} without catalog entry, {} rejected, {} folder(s); {} show(s) changed",
                totals.matched,
                totals.extras,
                totals.unmatched,
                totals.rejected,
                totals.directories,
                report.refreshed
            );
            print_failures(&report.failed);
        }
        Command::Availability => {
            let report = library.calculate_availability(today)?;
            println!("{} episode(s) available", report.available);
        }
        Command::Refresh => {
            library.refresh_everything(&index_files(&config.binaries_pattern)?, today)?;
            println!("Library holds {} show(s)", library.store().len());
        }
        Command::Filter { kind, value } => {
            let filter = kind.into_filter(value.as_deref())?;
            for show in &library.filter_shows(&filter, today) {
                println!("{}", show_line(show));
            }
        }
        Command::Groups => print_groups(&library.groups(today)),
        Command::Seen { old_path, new_path } => {
            let new_path = new_path.unwrap_or_else(|| watched_path_for(&old_path));
            let changed = library.seen_it(&old_path, &new_path)?;
            if changed == 0 {
                anyhow::bail!("No episode is bound to {old_path}");
            }
            println!("Marked {changed} episode(s) seen as {new_path}");
        }
        Command::Add { name } => {
            let show = library.add_show(&name)?;
            match &show.showid {
                Some(id) => println!("Added {} (id {id})", show.name),
                None => println!("Added {} (no provider match)", show.name),
            }
        }
        Command::Remove { show } => {
            let removed = library.remove_show(&show)?;
            println!("Removed {}", removed.name);
        }
        Command::Ignore { show, undo } => {
            let show = library.update_show(&show, |s| s.ignore_unwatched = !undo)?;
            println!("{}: ignore_unwatched = {}", show.name, show.ignore_unwatched);
        }
        Command::Tag { show, action, tag } => {
            let show = library.update_show(&show, |s| match action {
                TagAction::Add if !s.tags.contains(&tag) => s.tags.push(tag.clone()),
                TagAction::Add => {}
                TagAction::Remove => s.tags.retain(|t| t != &tag),
            })?;
            println!("{}: {}", show.name, show.tags.join(", "));
        }
        Command::Unknown => {
            for line in library.unknown_files(&index_files(&config.binaries_pattern)?)? {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn open_library(config: &Config) -> Result<Library> {
    let store = ShowStore::open(&config.store_path)?;
    let fetcher = TvMazeClient::new(&config.metadata_url, config.fetch_timeout(), config.fetch_interval())?;
    let covers = CoverCache::new(&config.covers_dir, config.fetch_timeout())?;
    Library::new(store, Box::new(fetcher), Some(covers), config.fetch_workers)
}

fn show_line(show: &Show) -> String {
    format!(
        "{:<40} {:<10} {}",
        show.name,
        show.airday().unwrap_or("-"),
        show.ended_label()
    )
}

fn print_groups(groups: &FilterGroups) {
    for (state, shows) in &groups.states {
        println!("[{state}] {}", names(shows));
    }
    for (day, shows) in &groups.available {
        println!("[available on {day}] {}", names(shows));
    }
    for (genre, shows) in &groups.genres {
        println!("[{genre}] {}", names(shows));
    }
}

fn names(shows: &[Show]) -> String {
    shows.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", ")
}

fn print_failures<'a>(failed: impl IntoIterator<Item = &'a String>) {
    for name in failed {
        eprintln!("Warning: {name} failed, see log for details");
    }
}
