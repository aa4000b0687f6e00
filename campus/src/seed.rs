use anyhow::Context;
use delivery::storage::DeliveryStorage;
use futures::future::try_join_all;

use crate::catalog::CANTEENS;

/// Upserts every catalog canteen. Returns how many were newly created.
pub async fn seed_catalog(
    storage: &dyn DeliveryStorage,
    at: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<usize> {
    let results = try_join_all(CANTEENS.iter().map(|canteen| async move {
        storage
            .upsert_canteen(canteen.to_new_canteen(), at)
            .await
            .with_context(|| format!("Failed to seed canteen {}", canteen.name))
    }))
    .await?;

    let created = results.iter().filter(|(_, created)| *created).count();
    tracing::info!(total = results.len(), created, "Seeded canteen catalog");
    Ok(created)
}
