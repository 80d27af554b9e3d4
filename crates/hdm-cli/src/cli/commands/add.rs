//! `hdm add`: insert a pending download request.

use anyhow::Result;
use hdm_core::store::StateDb;

pub async fn run_add(
    db: StateDb,
    url: &str,
    hoster: &str,
    priority: i64,
    fingerprint: Option<&str>,
) -> Result<()> {
    if db.get_hoster(hoster).await?.is_none() {
        anyhow::bail!("unknown hoster '{}' (try `hdm hosters`)", hoster);
    }

    let fingerprint = fingerprint.unwrap_or(url);
    match db.add_download(hoster, url, fingerprint, priority).await? {
        Some(id) => println!("added download {} for hoster {}", id, hoster),
        None => println!("already queued for {} (same fingerprint), nothing added", hoster),
    }
    Ok(())
}
