use kanshi_core::common::Symbol;
use kanshi_core::market::entity::{Dimension, SubScore};
use kanshi_core::market::error::ProviderError;
use kanshi_core::market::port::IndicatorSource;
use kanshi_feed::JsonFileSource;
use tempfile::tempdir;

#[tokio::test]
async fn test_reads_reading_from_symbol_file() -> anyhow::Result<()> {
    let dir = tempdir()?;
    std::fs::write(
        dir.path().join("AAPL.json"),
        r#"{
            "price": 187.2,
            "sub_scores": {
                "fundamental": 0.8,
                "technical": 0.7,
                "sentiment": { "unavailable": "no news" }
            },
            "metrics": { "volatility": 0.031, "news_impact": 0.45 }
        }"#,
    )?;

    let source = JsonFileSource::new(dir.path());
    let reading = source.fetch(&Symbol::from("AAPL")).await?;

    assert_eq!(reading.price, 187.2);
    assert_eq!(reading.sub_scores.get(&Dimension::fundamental()), Some(&SubScore::Available(0.8)));
    assert_eq!(
        reading.sub_scores.get(&Dimension::sentiment()),
        Some(&SubScore::unavailable("no news"))
    );
    assert_eq!(reading.volatility(), Some(0.031));
    assert_eq!(reading.metrics.news_impact, Some(0.45));
    assert_eq!(reading.metrics.breakout, None);
    Ok(())
}

#[tokio::test]
async fn test_metrics_are_optional() -> anyhow::Result<()> {
    let dir = tempdir()?;
    std::fs::write(
        dir.path().join("MSFT.json"),
        r#"{ "price": 410.0, "sub_scores": { "technical": 0.55 } }"#,
    )?;

    let reading = JsonFileSource::new(dir.path()).fetch(&Symbol::from("MSFT")).await?;
    assert_eq!(reading.volatility(), None);
    assert_eq!(reading.sub_scores.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let dir = tempdir().unwrap();
    let err = JsonFileSource::new(dir.path())
        .fetch(&Symbol::from("NOPE"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)));
}

#[tokio::test]
async fn test_malformed_file_is_parse_error() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("BAD.json"), "{ price: oops }").unwrap();
    let err = JsonFileSource::new(dir.path())
        .fetch(&Symbol::from("BAD"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Parse(_)));
}

#[tokio::test]
async fn test_path_traversal_is_rejected() {
    let dir = tempdir().unwrap();
    let source = JsonFileSource::new(dir.path().join("feed"));
    for symbol in ["../secret", "a/b", "..", ""] {
        let err = source.fetch(&Symbol::from(symbol)).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)), "symbol {:?}", symbol);
    }
}
