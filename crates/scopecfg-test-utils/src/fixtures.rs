use scopecfg_protocol::{ApplicationId, TagId};
use scopecfg_store::{ScopeCatalog, StoreError};

/// Ids of the records created by [`seed_catalog`].
#[derive(Debug, Clone, Copy)]
pub struct SeededCatalog {
    /// Application `orders`.
    pub app_x: ApplicationId,
    /// Application `billing`.
    pub app_b: ApplicationId,
    /// Tag `Production` in group `Environment`.
    pub tag_y: TagId,
    /// Tag `Staging` in group `Environment`.
    pub tag_z: TagId,
}

/// Register two applications and two tags.
pub async fn seed_catalog(catalog: &dyn ScopeCatalog) -> Result<SeededCatalog, StoreError> {
    let app_x = catalog.insert_application("orders", None).await?.id;
    let app_b = catalog.insert_application("billing", None).await?.id;
    let tag_y = catalog.insert_tag("Production", "Environment").await?.id;
    let tag_z = catalog.insert_tag("Staging", "Environment").await?.id;
    Ok(SeededCatalog {
        app_x,
        app_b,
        tag_y,
        tag_z,
    })
}
