use hddb_store::{
    CatalogApi, DatabaseApi, DatabaseKey, Dataset, FetchApi, FetchParams, FieldsParams,
    FilterModel, HdConfig, HdError, HdResult, HdStore, LimitsConfig, TextFilterType, ROW_KEY,
};
use serde_json::{json, Value as JsonValue};
use tempfile::{tempdir, TempDir};

struct Fixture {
    _dir: TempDir,
    store: HdStore,
    key: DatabaseKey,
    country: String,
    city: String,
    name: String,
}

const PEOPLE: [(&str, &str, &str); 6] = [
    ("Ada", "UK", "London"),
    ("Alan", "UK", "Manchester"),
    ("Grace", "US", "New York"),
    ("Edsger", "NL", "Rotterdam"),
    ("Barbara", "US", "Boston"),
    ("Ken", "US", "New York"),
];

async fn fixture(limits: Option<LimitsConfig>) -> HdResult<Fixture> {
    let dir = tempdir().expect("tempdir");
    let mut config =
        HdConfig::default_sqlite(dir.path().join("gateway.sqlite").to_string_lossy());
    if limits.is_some() {
        config.limits = limits;
    }
    let store = HdStore::connect(&config, dir.path()).await?;
    let key = DatabaseKey::new("acme", "crm")?;
    let records: Vec<_> = PEOPLE
        .iter()
        .map(|(name, country, city)| {
            json!({"Name": name, "Country": country, "City": city})
                .as_object()
                .cloned()
                .expect("object")
        })
        .collect();
    let dataset = Dataset::from_records(&records)?;
    store
        .create_database_with_tables(&key, &[dataset], &["people".to_string()])
        .await?;

    let fields = store
        .list_fields(&key, "people", FieldsParams::default())
        .await?;
    let id_of = |label: &str| {
        fields
            .iter()
            .find(|f| f.field.label == label)
            .map(|f| f.field.id.clone())
            .expect("field")
    };
    Ok(Fixture {
        country: id_of("Country"),
        city: id_of("City"),
        name: id_of("Name"),
        _dir: dir,
        store,
        key,
    })
}

fn column<'a>(rows: &'a [serde_json::Map<String, JsonValue>], id: &str) -> Vec<&'a str> {
    rows.iter()
        .filter_map(|row| row.get(id).and_then(JsonValue::as_str))
        .collect()
}

#[tokio::test]
async fn leaf_pages_follow_the_window() -> HdResult<()> {
    let fx = fixture(None).await?;
    let params = FetchParams::new(2, 4).with_sort(format!("{} asc", fx.name));
    let result = fx.store.fetch_rows(&fx.key, "people", &params).await?;
    assert_eq!(result.row_count, 6);
    assert_eq!(column(&result.rows, &fx.name), ["Barbara", "Edsger"]);
    assert_eq!(result.rows[0].len(), 3);

    let tail = FetchParams::new(4, 100).with_sort(format!("{} asc", fx.name));
    let result = fx.store.fetch_rows(&fx.key, "people", &tail).await?;
    assert_eq!(column(&result.rows, &fx.name), ["Grace", "Ken"]);
    assert_eq!(result.row_count, 6);
    Ok(())
}

#[tokio::test]
async fn top_level_grouping_counts_distinct_values() -> HdResult<()> {
    let fx = fixture(None).await?;
    let params = FetchParams::new(0, 100)
        .with_sort(format!("{} desc", fx.country))
        .with_grouping([fx.country.clone(), fx.city.clone()], Vec::<String>::new());
    let result = fx.store.fetch_rows(&fx.key, "people", &params).await?;
    assert_eq!(result.row_count, 3);
    assert_eq!(column(&result.rows, &fx.country), ["US", "UK", "NL"]);
    for row in &result.rows {
        assert_eq!(row.len(), 2);
        let key = row.get(ROW_KEY).and_then(JsonValue::as_str).expect("row key");
        assert_eq!(key.len(), 32);
    }
    Ok(())
}

#[tokio::test]
async fn drill_down_counts_the_next_level() -> HdResult<()> {
    let fx = fixture(None).await?;
    let params = FetchParams::new(0, 100)
        .with_sort(format!("{} asc, {} asc", fx.country, fx.city))
        .with_grouping([fx.country.clone(), fx.city.clone()], ["US"]);
    let result = fx.store.fetch_rows(&fx.key, "people", &params).await?;
    assert_eq!(result.row_count, 2);
    assert_eq!(column(&result.rows, &fx.city), ["Boston", "New York"]);

    let leaf = FetchParams::new(0, 100)
        .with_sort(format!("{} asc", fx.name))
        .with_grouping([fx.country.clone(), fx.city.clone()], ["US", "New York"]);
    let result = fx.store.fetch_rows(&fx.key, "people", &leaf).await?;
    assert_eq!(result.row_count, 2);
    assert_eq!(column(&result.rows, &fx.name), ["Grace", "Ken"]);
    Ok(())
}

#[tokio::test]
async fn filters_restrict_rows_and_counts() -> HdResult<()> {
    let fx = fixture(None).await?;
    let starts = FetchParams::new(0, 100)
        .with_sort(format!("{} asc", fx.name))
        .with_filter(
            fx.name.clone(),
            FilterModel::text(TextFilterType::StartsWith, "A"),
        );
    let result = fx.store.fetch_rows(&fx.key, "people", &starts).await?;
    assert_eq!(result.row_count, 2);
    assert_eq!(column(&result.rows, &fx.name), ["Ada", "Alan"]);

    let not_us = FetchParams::new(0, 100).with_filter(
        fx.country.clone(),
        FilterModel::text(TextFilterType::NotEqual, "US"),
    );
    assert_eq!(
        fx.store
            .fetch_rows(&fx.key, "people", &not_us)
            .await?
            .row_count,
        3
    );

    let wildcard = FetchParams::new(0, 100).with_filter(
        fx.city.clone(),
        FilterModel::text(TextFilterType::Contains, "%"),
    );
    assert_eq!(
        fx.store
            .fetch_rows(&fx.key, "people", &wildcard)
            .await?
            .row_count,
        0
    );

    let grouped = FetchParams::new(0, 100)
        .with_grouping([fx.country.clone()], Vec::<String>::new())
        .with_filter(
            fx.city.clone(),
            FilterModel::text(TextFilterType::EndsWith, "York"),
        );
    let result = fx.store.fetch_rows(&fx.key, "people", &grouped).await?;
    assert_eq!(result.row_count, 1);
    assert_eq!(column(&result.rows, &fx.country), ["US"]);
    Ok(())
}

#[tokio::test]
async fn null_filters_match_cleaned_empty_values() -> HdResult<()> {
    let dir = tempdir().expect("tempdir");
    let config = HdConfig::default_sqlite(dir.path().join("gateway.sqlite").to_string_lossy());
    let store = HdStore::connect(&config, dir.path()).await?;
    let key = DatabaseKey::new("acme", "notes")?;
    let dataset = Dataset::new(
        vec!["Note".into()],
        vec![
            vec!["hello".into()],
            vec!["None".into()],
            vec![hddb_store::CellValue::Null],
        ],
    )?;
    store
        .create_database_with_tables(&key, &[dataset], &["notes".to_string()])
        .await?;
    let fields = store
        .list_fields(&key, "notes", FieldsParams::default())
        .await?;
    let note = fields[0].field.id.clone();

    let empty = FetchParams::new(0, 10)
        .with_filter(note.clone(), FilterModel::null_check(TextFilterType::IsNull));
    assert_eq!(store.fetch_rows(&key, "notes", &empty).await?.row_count, 2);
    let filled =
        FetchParams::new(0, 10).with_filter(note, FilterModel::null_check(TextFilterType::IsNotNull));
    assert_eq!(store.fetch_rows(&key, "notes", &filled).await?.row_count, 1);
    Ok(())
}

#[tokio::test]
async fn invalid_requests_fail_before_the_engine() -> HdResult<()> {
    let fx = fixture(Some(LimitsConfig {
        max_insert_rows: Some(2),
        max_categories: None,
        max_page_size: Some(50),
    }))
    .await?;
    assert_eq!(fx.store.get_table_metadata(&fx.key, "people").await?.nrow, 6);

    let cases = [
        FetchParams::new(5, 5),
        FetchParams::new(0, 51),
        FetchParams::new(0, 10).with_sort("name; DROP TABLE people"),
        FetchParams::new(0, 10).with_grouping([fx.country.clone()], ["US", "extra"]),
        FetchParams::new(0, 10).with_sort("missing_column asc"),
    ];
    for params in cases {
        let err = fx
            .store
            .fetch_rows(&fx.key, "people", &params)
            .await
            .unwrap_err();
        assert!(matches!(err, HdError::Validation { .. }), "{params:?}: {err:?}");
    }
    Ok(())
}

#[tokio::test]
async fn unknown_table_is_not_found() -> HdResult<()> {
    let fx = fixture(None).await?;
    let err = fx
        .store
        .fetch_rows(&fx.key, "nope", &FetchParams::new(0, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, HdError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn group_key_values_are_bound_not_spliced() -> HdResult<()> {
    let fx = fixture(None).await?;
    let params = FetchParams::new(0, 10)
        .with_grouping([fx.country.clone(), fx.city.clone()], ["US' OR '1'='1"]);
    let result = fx.store.fetch_rows(&fx.key, "people", &params).await?;
    assert_eq!(result.row_count, 0);
    assert!(result.rows.is_empty());
    Ok(())
}
