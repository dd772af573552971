//! Demo rows for an empty store.

use chrono::{Duration, Utc};
use devduo_core::{Collection, ConsoleResult, Record, RecordStore, SledRecordStore};

pub async fn seed_if_empty(store: &SledRecordStore) -> ConsoleResult<()> {
    let mut existing = 0;
    for collection in Collection::ALL {
        existing += store.count(collection, None).await?;
    }
    if existing > 0 {
        tracing::info!("[SEED] Store already holds {} row(s), skipping demo data", existing);
        return Ok(());
    }

    let now = Utc::now();
    let ago = |minutes: i64| now - Duration::minutes(minutes);

    for (i, email) in ["ops@devduo.dev", "client@example.com", "visitor@example.com"]
        .iter()
        .enumerate()
    {
        store.put(
            Collection::Profiles,
            &Record::new(format!("profile_{}", i)).with_field("email", *email),
        )?;
    }

    let projects = [
        ("Atlas Storefront", Some("Web Development"), 40),
        ("Pulse Fitness", Some("Mobile App"), 60 * 5),
        ("Ledger Sync", Some("Blockchain"), 60 * 30),
        ("Internal Wiki", None, 60 * 24 * 3),
    ];
    for (i, (title, category, minutes)) in projects.into_iter().enumerate() {
        let record = Record::new(format!("project_{}", i))
            .with_field("title", title)
            .created(ago(minutes));
        let record = match category {
            Some(c) => record.with_category(c),
            None => record,
        };
        store.put(Collection::Projects, &record)?;
    }

    store.put(
        Collection::Testimonials,
        &Record::new("feedback_0")
            .with_field("client_name", "Rina Okafor")
            .with_field("rating", 5)
            .created(ago(12)),
    )?;
    store.put(
        Collection::Messages,
        &Record::new("message_0")
            .with_field("name", "Sam Lee")
            .with_field("subject", "Quote request")
            .created(ago(3)),
    )?;

    tracing::info!("[SEED] Demo data written");
    Ok(())
}
