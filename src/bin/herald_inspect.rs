//! herald-inspect: Message log inspector
//!
//! Prints stored message logs as JSON lines, using the same configuration
//! as the services embedding the store.
//!
//! ## Usage
//! ```text
//! herald-inspect <namespace>          # last list window
//! herald-inspect <namespace> <uid>    # one record
//! ```
//!
//! ## Configuration
//! - HERALD_CONFIG: Path to a YAML config file (optional)
//! - HERALD__STORAGE__TYPE etc.: Environment overrides
//! - HERALD_LOG: Log filter (default: info)

use tracing::info;

use herald::codec::encode_line;
use herald::config::Config;
use herald::model::ListFilter;
use herald::storage::init_storage;
use herald::uid::Uid;
use herald::utils::bootstrap::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let Some(namespace) = args.next() else {
        return Err("usage: herald-inspect <namespace> [uid]".into());
    };
    let uid = args.next().map(|raw| raw.parse::<Uid>()).transpose()?;

    let config = Config::load(None)?;
    let store = init_storage(&config.storage).await?;

    match uid {
        Some(uid) => {
            let log = store.get(&namespace, uid).await?;
            println!("{}", encode_line(&log)?);
        }
        None => {
            let page = store.list(&namespace, &ListFilter::default()).await?;
            for log in &page.items {
                println!("{}", encode_line(log)?);
            }
            info!(namespace = %namespace, total = page.total, "Listed message logs");
        }
    }

    Ok(())
}
