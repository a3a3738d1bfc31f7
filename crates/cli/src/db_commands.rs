use {
    anyhow::{Context, Result},
    relaydesk_config::RelayConfig,
    relaydesk_sessions::{HistoryCounts, HistorySink, SqliteHistory},
};

/// Print durable row counts from the history database.
pub async fn stats(config: &RelayConfig) -> Result<()> {
    let url = &config.storage.database_url;
    let counts = read_counts(url).await?;
    println!("Database: {url}");
    println!("{}", render_counts(&counts));
    Ok(())
}

async fn read_counts(url: &str) -> Result<HistoryCounts> {
    let history = SqliteHistory::connect(url)
        .await
        .with_context(|| format!("failed to open history database {url}"))?;
    Ok(history.counts().await?)
}

fn render_counts(counts: &HistoryCounts) -> String {
    format!(
        "  sessions:      {}\n  messages:      {}\n  audit entries: {}",
        counts.sessions, counts.messages, counts.audit
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_database_has_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("relay.db").display());
        let counts = read_counts(&url).await.unwrap();
        assert_eq!(counts, HistoryCounts::default());
    }

    #[test]
    fn counts_render_one_per_line() {
        let rendered = render_counts(&HistoryCounts {
            sessions: 2,
            messages: 7,
            audit: 1,
        });
        assert_eq!(rendered.lines().count(), 3);
        assert!(rendered.contains("messages:      7"));
    }
}
