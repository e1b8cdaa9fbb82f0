//! Resource lifecycle verification
//!
//! Drives one remote resource through create, read, update, field deletion
//! and delete. Every action and every verification is a separate call so a
//! failure is attributable to either the write or the read-back.
//!
//! # Lifecycle
//!
//! ```text
//! Nonexistent -> Created -> Verified -> Updated -> Verified
//!             -> FieldsDeleted -> Verified -> Destroyed -> VerifiedDestroyed
//! ```
//!
//! The resource identifier is returned by [`ResourceLifecycle::create`] and
//! passed explicitly to every later call.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};
use crate::http::{ApiRequest, Transport};
use crate::snapshot::{FieldSet, Snapshot};

/// Server-assigned identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a resource collection lives and how creation reports the new id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEndpoint {
    /// Collection path, e.g. `/albums`
    pub collection: String,

    /// Field of the creation response holding the new id
    pub id_field: String,
}

impl ResourceEndpoint {
    pub fn new(collection: impl Into<String>, id_field: impl Into<String>) -> Self {
        Self {
            collection: collection.into().trim_end_matches('/').to_string(),
            id_field: id_field.into(),
        }
    }

    /// The album collection service
    pub fn albums() -> Self {
        Self::new("/albums", "album_id")
    }

    pub fn item_path(&self, id: ResourceId) -> String {
        format!("{}/{}", self.collection, id)
    }
}

/// Lifecycle operations against one collection
pub struct ResourceLifecycle<'a, T: Transport + ?Sized> {
    transport: &'a T,
    endpoint: ResourceEndpoint,
}

impl<'a, T: Transport + ?Sized> ResourceLifecycle<'a, T> {
    pub fn new(transport: &'a T, endpoint: ResourceEndpoint) -> Self {
        Self { transport, endpoint }
    }

    pub fn endpoint(&self) -> &ResourceEndpoint {
        &self.endpoint
    }

    /// Create a resource from a complete field set
    pub async fn create(&self, initial: &FieldSet) -> E2eResult<ResourceId> {
        let request = ApiRequest::post(&self.endpoint.collection, Value::Object(initial.clone()));
        let context = request.label();
        let response = self.transport.execute(request).await;
        response.require_success(format!("{} (create)", context))?;

        let id = response
            .body
            .as_ref()
            .and_then(|body| body.get(&self.endpoint.id_field))
            .and_then(parse_id)
            .ok_or_else(|| E2eError::CreationFailure {
                detail: format!(
                    "no '{}' in creation response: {}",
                    self.endpoint.id_field,
                    response.detail()
                ),
            })?;

        match response
            .body
            .as_ref()
            .and_then(|body| body.get("message"))
            .and_then(Value::as_str)
        {
            Some(message) => info!("{} with id: {}", message, id),
            None => info!("Created resource with id: {}", id),
        }

        Ok(id)
    }

    /// Read the resource and check it against `expected`.
    ///
    /// All divergent fields are reported together. Returns the observed
    /// representation.
    pub async fn verify(&self, id: ResourceId, expected: &Snapshot) -> E2eResult<FieldSet> {
        let observed = self.read(id).await?;

        let mismatches = expected.compare(&observed);
        if !mismatches.is_empty() {
            return Err(E2eError::VerificationMismatch {
                context: format!("{} {}", self.endpoint.collection, id),
                mismatches,
            });
        }

        for (name, value) in &observed {
            debug!("{}: {}", name, value);
        }
        info!("Resource {} matches {} expected field(s)", id, expected.len());
        Ok(observed)
    }

    /// Partial update. Does not verify.
    pub async fn update(&self, id: ResourceId, partial: &FieldSet) -> E2eResult<()> {
        let request = ApiRequest::patch(self.endpoint.item_path(id), Value::Object(partial.clone()));
        let context = request.label();
        self.transport
            .execute(request)
            .await
            .require_success(format!("{} (update)", context))?;

        info!("Updated {} field(s) of resource {}", partial.len(), id);
        Ok(())
    }

    /// Drop `names` by reading the full representation, removing them
    /// locally and writing the remainder back with a full replace.
    ///
    /// Not atomic: a field written by another client between the read and
    /// the write is lost.
    pub async fn delete_fields(&self, id: ResourceId, names: &[&str]) -> E2eResult<()> {
        let mut representation = self.read(id).await?;
        for name in names {
            if representation.remove(*name).is_none() {
                debug!("Field '{}' was not present on resource {}", name, id);
            }
        }

        let request = ApiRequest::put(self.endpoint.item_path(id), Value::Object(representation));
        let context = request.label();
        self.transport
            .execute(request)
            .await
            .require_success(format!("{} (delete fields {:?})", context, names))?;

        info!("Deleted fields {:?} from resource {}", names, id);
        Ok(())
    }

    pub async fn destroy(&self, id: ResourceId) -> E2eResult<()> {
        let request = ApiRequest::delete(self.endpoint.item_path(id));
        let context = request.label();
        self.transport
            .execute(request)
            .await
            .require_success(format!("{} (destroy)", context))?;

        info!("Delete call for resource {} succeeded", id);
        Ok(())
    }

    /// Passes only when reading the resource yields 404
    pub async fn verify_destroyed(&self, id: ResourceId) -> E2eResult<()> {
        let request = ApiRequest::get(self.endpoint.item_path(id));
        let context = request.label();
        let response = self.transport.execute(request).await;

        if response.is_not_found() {
            info!("Resource {} no longer exists", id);
            return Ok(());
        }
        if response.is_success() {
            return Err(E2eError::VerificationMismatch {
                context: format!("{} {} after delete", self.endpoint.collection, id),
                mismatches: vec![crate::error::FieldMismatch {
                    field: "status".to_string(),
                    expected: "404".to_string(),
                    actual: format!(
                        "{} with body {}",
                        response.status.unwrap_or_default(),
                        response.detail()
                    ),
                }],
            });
        }
        Err(response.failure(format!("{} (expected 404)", context)))
    }

    async fn read(&self, id: ResourceId) -> E2eResult<FieldSet> {
        let request = ApiRequest::get(self.endpoint.item_path(id));
        let context = request.label();
        let response = self.transport.execute(request).await;

        if response.is_not_found() {
            return Err(E2eError::ResourceNotFound { id: id.0 });
        }
        response.require_success(format!("{} (read)", context))?;
        Ok(response.json_object(&context)?.clone())
    }
}

/// Ids arrive as JSON integers, or occasionally as numeric strings
fn parse_id(value: &Value) -> Option<ResourceId> {
    match value {
        Value::Number(n) => n.as_u64().map(ResourceId),
        Value::String(s) => s.trim().parse().ok().map(ResourceId),
        _ => None,
    }
}

/// Position in the canonical lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Nonexistent,
    Created,
    Verified,
    Updated,
    FieldsDeleted,
    Destroyed,
    VerifiedDestroyed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Nonexistent => "nonexistent",
            LifecycleState::Created => "created",
            LifecycleState::Verified => "verified",
            LifecycleState::Updated => "updated",
            LifecycleState::FieldsDeleted => "fields_deleted",
            LifecycleState::Destroyed => "destroyed",
            LifecycleState::VerifiedDestroyed => "verified_destroyed",
        };
        f.write_str(name)
    }
}

/// A state reached during a lifecycle run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: LifecycleState,
    pub label: String,
}

/// Enforces the canonical order: no transition may be skipped
#[derive(Debug, Clone)]
pub struct LifecycleTracker {
    state: LifecycleState,
    /// Action that led to the most recent `Verified`
    verified_after: Option<LifecycleState>,
    checkpoints: Vec<Checkpoint>,
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Nonexistent,
            verified_after: None,
            checkpoints: Vec::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn into_checkpoints(self) -> Vec<Checkpoint> {
        self.checkpoints
    }

    /// Move to `next`, failing if that skips or repeats a step
    pub fn advance(&mut self, next: LifecycleState, label: impl Into<String>) -> E2eResult<()> {
        use LifecycleState::*;

        let allowed = match (self.state, self.verified_after, next) {
            (Nonexistent, _, Created) => true,
            (Created | Updated | FieldsDeleted, _, Verified) => true,
            (Verified, Some(Created), Updated) => true,
            (Verified, Some(Updated), FieldsDeleted) => true,
            (Verified, Some(FieldsDeleted), Destroyed) => true,
            (Destroyed, _, VerifiedDestroyed) => true,
            _ => false,
        };
        if !allowed {
            return Err(E2eError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        if next == Verified {
            self.verified_after = Some(self.state);
        }
        self.state = next;
        self.checkpoints.push(Checkpoint {
            state: next,
            label: label.into(),
        });
        Ok(())
    }
}

/// Album used by the canonical lifecycle run
pub fn album_initial_fields() -> FieldSet {
    to_fields(json!({
        "title": "Greatest Hits",
        "artist": "The Best Band",
        "label": "Odd Man Out",
        "genre": "Rock",
        "year": 2023,
        "songs": 12
    }))
}

/// Partial update applied after creation
pub fn album_update_fields() -> FieldSet {
    to_fields(json!({
        "title": "Ultimate Hits",
        "year": 2024,
        "songs": 10
    }))
}

/// Fields removed by the full-replace step
pub const ALBUM_DELETED_FIELDS: [&str; 2] = ["genre", "year"];

fn to_fields(value: Value) -> FieldSet {
    match value {
        Value::Object(map) => map,
        _ => FieldSet::new(),
    }
}

/// Run create, verify, update, verify, delete fields, verify, destroy and
/// verify-destroyed against one album.
pub async fn run_album_lifecycle<T: Transport + ?Sized>(
    transport: &T,
    endpoint: ResourceEndpoint,
) -> E2eResult<Vec<Checkpoint>> {
    let albums = ResourceLifecycle::new(transport, endpoint);
    let mut tracker = LifecycleTracker::new();

    let initial = album_initial_fields();
    let id = albums.create(&initial).await?;
    tracker.advance(LifecycleState::Created, format!("created album {}", id))?;

    let created = Snapshot::from_fields(&initial);
    info!("Validating after creation");
    albums.verify(id, &created).await?;
    tracker.advance(LifecycleState::Verified, "verified after creation")?;

    let updates = album_update_fields();
    albums.update(id, &updates).await?;
    tracker.advance(LifecycleState::Updated, "updated title, year and songs")?;

    let updated = created.with_updates(&updates);
    info!("Validating after updating title, year and songs");
    albums.verify(id, &updated).await?;
    tracker.advance(LifecycleState::Verified, "verified after update")?;

    albums.delete_fields(id, &ALBUM_DELETED_FIELDS).await?;
    tracker.advance(LifecycleState::FieldsDeleted, "deleted genre and year")?;

    let pruned = updated.with_absent(&ALBUM_DELETED_FIELDS);
    info!("Validating after deleting genre and year");
    albums.verify(id, &pruned).await?;
    tracker.advance(LifecycleState::Verified, "verified after field deletion")?;

    albums.destroy(id).await?;
    tracker.advance(LifecycleState::Destroyed, format!("deleted album {}", id))?;

    albums.verify_destroyed(id).await?;
    tracker.advance(LifecycleState::VerifiedDestroyed, "album is gone")?;

    Ok(tracker.into_checkpoints())
}
