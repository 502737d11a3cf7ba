use clap::Parser;
use streamgrab::fetch::HttpFetcher;
use streamgrab::pipeline::resolve_batch;
use streamgrab::playlist::{Playlist, PlaylistEntry};

pub(crate) mod cli;
pub(crate) mod logger;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse arguments
    let args = cli::Args::parse();

    // Set up logger
    if let Err(err) = logger::init(args.debug) {
        eprintln!("Failed to set up logger: {}", err);
    }

    let config = match args.resolver_config().await {
        Ok(config) => config,
        Err(err) => {
            log::error!("Invalid configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    let pages = match args.page_requests().await {
        Ok(pages) => pages,
        Err(err) => {
            log::error!("Failed to read pages: {:#}", err);
            std::process::exit(1);
        }
    };

    if pages.is_empty() {
        log::warn!("No pages given, writing an empty playlist");
    }

    let fetcher = match HttpFetcher::new() {
        Ok(fetcher) => fetcher,
        Err(err) => {
            log::error!("Failed to create HTTP client: {}", err);
            std::process::exit(1);
        }
    };

    let total = pages.len();
    let outcomes = resolve_batch(&fetcher, &config, pages, args.concurrent.get()).await;

    // Failed pages are left out of the playlist
    let mut playlist = Playlist::new();

    for outcome in &outcomes {
        if let Ok(stream) = &outcome.result {
            playlist.push(PlaylistEntry::new(
                &outcome.request.meta,
                &outcome.request.url,
                &stream.manifest_url,
                args.group.as_deref(),
            ));
        }
    }

    let rendered = playlist.render();

    match &args.output {
        Some(path) => {
            if let Err(err) = tokio::fs::write(path, rendered).await {
                log::error!("Failed to write playlist to {}: {}", path.display(), err);
                std::process::exit(1);
            }

            log::info!("Wrote playlist to {}", path.display());
        }
        None => print!("{rendered}"),
    }

    let resolved = playlist.len();
    log::info!("Resolved {} of {} page(s), {} failed", resolved, total, total - resolved);

    if total > 0 && resolved == 0 {
        std::process::exit(1);
    }
}
