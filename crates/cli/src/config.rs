use ecrag_core::config::{load_dotenv, Config};
use tracing::info;

use crate::cli::CliArgs;

/// Resolve the runtime config: `.env`, then the environment (profiled), then flags.
pub fn resolve(args: &CliArgs) -> Config {
    load_dotenv();
    let config = match &args.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    apply_overrides(config, args)
}

fn apply_overrides(mut config: Config, args: &CliArgs) -> Config {
    if let Some(dir) = &args.index_dir {
        config.storage.index_dir = dir.clone();
    }
    if let Some(top_n) = args.top_n {
        config.retrieval.top_n = top_n;
        // Retrieval has to over-fetch for re-ranking to choose from.
        if config.retrieval.fetch_k <= top_n {
            let fetch_k = top_n.saturating_mul(2).max(top_n + 1);
            info!(
                top_n,
                from = config.retrieval.fetch_k,
                to = fetch_k,
                "raising fetch_k for --top-n"
            );
            config.retrieval.fetch_k = fetch_k;
        }
    }
    config
}
