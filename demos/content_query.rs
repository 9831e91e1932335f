//! Seeds a small product catalog and reads it back through the content client.
//!
//! Set `CMS_DATABASE_URL` (for example `http://127.0.0.1:9000/?ns=cms-demo`) to
//! run against a Realtime Database emulator; without it the data stays in memory.

use realtime_cms::cms::{Cms, CmsConfig, CmsEvent, CmsResult, MenuStructure, QueryOptions};
use realtime_cms::database::EventKind;
use realtime_cms::logger::{set_log_level, LogLevel};
use serde_json::json;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    set_log_level(LogLevel::Debug)?;

    let mut config = CmsConfig::default().with_locales(["en-US", "de-DE"]);
    config.database_url = std::env::var("CMS_DATABASE_URL").ok();
    let cms = Cms::initialize(config)?;
    let content = cms.content();

    content
        .set(
            "products",
            json!({
                "1491827711368": {
                    "titleA": "Metris Shower/Bath Finish Set Round Large",
                    "price": "123.00",
                    "category": "shower"
                },
                "1491827799120": {
                    "titleA": "Talis Kitchen Faucet",
                    "price": "249.00",
                    "category": "kitchen"
                }
            }),
        )
        .await?;

    // Watch price changes while the demo runs.
    let subscription = content
        .subscribe(
            "products",
            EventKind::ChildChanged,
            &QueryOptions::new().fields(["price"]),
            |event: CmsResult<CmsEvent>| match event {
                Ok(event) => println!("changed {:?}: {}", event.key, event.value),
                Err(err) => eprintln!("subscription failed: {err}"),
            },
        )
        .await?;

    let entry = content
        .get(
            ("products", "1491827711368"),
            &QueryOptions::from_value(&json!({ "fields": ["titleA", "price"] }))?,
        )
        .await?;
    println!("entry: {entry}");

    let showers = content
        .get_by_field("products", "category", "shower", &QueryOptions::new())
        .await?;
    println!("showers: {showers}");

    let key = content
        .add("products", json!({ "titleA": "Raindance Hand Shower", "price": "89.00" }))
        .await?;
    println!("added product {key}");

    content
        .update(
            "products",
            serde_json::from_value(json!({ "1491827711368/price": "119.00" }))?,
        )
        .await?;

    cms.navigation()
        .set(
            "main",
            json!({
                "items": [
                    { "id": 1, "title": "Bathroom", "order": 1, "parentIndex": 0 },
                    { "id": 2, "title": "Showers", "order": 1, "parentIndex": 1 }
                ]
            }),
        )
        .await?;
    let menu = cms
        .navigation()
        .get_items("main", MenuStructure::Nested, &QueryOptions::new())
        .await?;
    println!("menu: {menu}");

    subscription.unsubscribe();
    Ok(())
}
