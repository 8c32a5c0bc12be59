use edgar_sync::core::catalog::load_catalog;
use edgar_sync::error::AppError;
use std::io::Write;

fn write_catalog(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn same_file_always_yields_same_sorted_ids() {
    let file = write_catalog(
        r#"{"companies": [
            {"cik": "0001018724", "ticker": "AMZN"},
            {"cik": 320193, "ticker": "AAPL"},
            {"cik_raw": "CIK0000789019", "ticker": "MSFT"},
            {"cik": "320193", "ticker": "AAPL.DUP"}
        ]}"#,
    );

    let first = load_catalog(file.path()).await.unwrap();
    let second = load_catalog(file.path()).await.unwrap();

    let ids: Vec<String> = first.ids().iter().map(ToString::to_string).collect();
    assert_eq!(ids, ["0000320193", "0000789019", "0001018724"]);
    assert_eq!(first.ids(), second.ids());
    assert_eq!(first.total_declared(), 3);
}

#[tokio::test]
async fn missing_or_malformed_catalog_is_fatal() {
    let missing = load_catalog(std::path::Path::new("/definitely/not/here.json")).await;
    assert!(matches!(missing, Err(AppError::CatalogUnreadable { .. })));

    let file = write_catalog("{\"companies\": [");
    let err = load_catalog(file.path()).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("invalid JSON"));
}
