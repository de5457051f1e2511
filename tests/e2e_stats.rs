//! End-to-end tests for filtered appraisal statistics.
//!
//! Tests mean/median over the parsed `Valor de avaliação`, exclusion of
//! unparseable values, empty subsets, and the price-range filter.

use leiloes_rs::{fields, Catalog, FilterQuery, FilterSelection, FilteredStats, MemoryStore, Property};
use pretty_assertions::assert_eq;

// ============================================================================
// Helper
// ============================================================================

fn valued(uf: &str, n: &str, city: &str, appraisal: &str, price: &str) -> Property {
    Property::new(uf, n)
        .with_field(fields::CIDADE, city)
        .with_field(fields::VALOR_AVALIACAO, appraisal)
        .with_field(fields::PRECO, price)
}

async fn setup(props: Vec<Property>) -> Catalog<MemoryStore> {
    let catalog = Catalog::open_memory().await.unwrap();
    catalog.store().extend(props);
    catalog
}

// ============================================================================
// 1. Mean and median
// ============================================================================

#[tokio::test]
async fn test_three_values_mean_equals_median() {
    let catalog = setup(vec![
        valued("SP", "1", "Campinas", "100.000,00", "90.000,00"),
        valued("SP", "2", "Campinas", "200.000,00", "150.000,00"),
        valued("SP", "3", "Santos", "300.000,00", "250.000,00"),
    ])
    .await;

    let stats = catalog.get_filtered_stats(&FilterSelection::new()).await.unwrap();
    assert_eq!(stats, FilteredStats { average: 200_000.0, median: 200_000.0, count: 3 });
}

#[tokio::test]
async fn test_even_count_median_interpolates() {
    let catalog = setup(vec![
        valued("SP", "1", "Campinas", "100.000,00", "1"),
        valued("SP", "2", "Campinas", "200.000,00", "1"),
        valued("SP", "3", "Campinas", "400.000,00", "1"),
        valued("SP", "4", "Campinas", "1.000.000,00", "1"),
    ])
    .await;

    let stats = catalog.get_filtered_stats(&FilterSelection::new()).await.unwrap();
    assert_eq!(stats.median, 300_000.0);
    assert_eq!(stats.average, 425_000.0);
}

#[tokio::test]
async fn test_filter_narrows_stats() {
    let catalog = setup(vec![
        valued("SP", "1", "Campinas", "100.000,00", "1"),
        valued("SP", "2", "Santos", "500.000,00", "1"),
        valued("RJ", "3", "Niterói", "900.000,00", "1"),
    ])
    .await;

    let filter = FilterSelection::new().with_uf("SP").with_cities("Santos");
    let stats = catalog.get_filtered_stats(&filter).await.unwrap();
    assert_eq!(stats.average, 500_000.0);
    assert_eq!(stats.count, 1);
}

// ============================================================================
// 2. Unparseable and empty
// ============================================================================

#[tokio::test]
async fn test_unparseable_values_excluded() {
    let catalog = setup(vec![
        valued("SP", "1", "Campinas", "100.000,00", "1"),
        valued("SP", "2", "Campinas", "R$ 999,00", "1"),
        valued("SP", "3", "Campinas", "", "1"),
        Property::new("SP", "4").with_field(fields::CIDADE, "Campinas"),
    ])
    .await;

    let stats = catalog.get_filtered_stats(&FilterSelection::new()).await.unwrap();
    assert_eq!(stats, FilteredStats { average: 100_000.0, median: 100_000.0, count: 1 });
}

#[tokio::test]
async fn test_empty_subset_is_zero() {
    let catalog = setup(vec![valued("SP", "1", "Campinas", "100.000,00", "1")]).await;

    let stats = catalog
        .get_filtered_stats(&FilterSelection::new().with_uf("AM"))
        .await
        .unwrap();
    assert_eq!(stats, FilteredStats::default());
    assert!(!stats.has_data());
}

#[tokio::test]
async fn test_malformed_payload_skipped() {
    let store = MemoryStore::from_properties(vec![valued("SP", "1", "Campinas", "50.000,00", "1")]);
    store.insert_raw("SP", "2", "[\"not\", \"an object\"]");
    let catalog = Catalog::with_store(store, Default::default()).unwrap();

    let stats = catalog
        .get_filtered_stats(&FilterSelection::new().with_uf("SP"))
        .await
        .unwrap();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.average, 50_000.0);
}

// ============================================================================
// 3. Price range
// ============================================================================

#[tokio::test]
async fn test_price_range_applies_to_stats() {
    let catalog = setup(vec![
        valued("SP", "1", "Campinas", "100.000,00", "80.000,00"),
        valued("SP", "2", "Campinas", "200.000,00", "160.000,00"),
        valued("SP", "3", "Campinas", "300.000,00", "240.000,00"),
        valued("SP", "4", "Campinas", "400.000,00", "a combinar"),
    ])
    .await;

    let query = FilterQuery {
        price_min: Some(100_000.0),
        price_max: Some(240_000.0),
        ..FilterQuery::default()
    };
    let stats = catalog.get_filtered_stats(&query.selection()).await.unwrap();
    assert_eq!(stats.count, 2);
    assert_eq!(stats.average, 250_000.0);
}
