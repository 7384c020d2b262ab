//! Society administration: passkey login and management of owned events, posts and merchandise.
//!
//! Multi-step operations (create then list on the society, delete blob then document then
//! unlist) run in sequence without compensation; a failure part way leaves the earlier steps
//! applied.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    blobs::BlobStorage,
    errors::{AdminError, StorageError, StoreError},
    model::{OwnedRecord, Record, Society, decode_record, encode_record},
    store::{DocumentPatch, DocumentSnapshot, DocumentStore},
};

/// Editable presentation fields of a society.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SocietyProfile {
    pub name: String,
    pub description: String,
    pub category: String,
}

pub struct SocietyAdmin {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStorage>,
    society: Society,
}

impl SocietyAdmin {
    /// Opens an admin session for an existing society whose passkey matches.
    pub async fn login(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStorage>,
        society_id: &str,
        passkey: &str,
    ) -> Result<Self, AdminError> {
        let society = load_society(store.as_ref(), society_id).await?;
        if society.passkey.as_deref() != Some(passkey) {
            warn!(society_id, "admin login rejected");
            return Err(AdminError::IncorrectPasskey);
        }
        info!(society_id, "admin logged in");
        Ok(Self { store, blobs, society })
    }

    pub fn society(&self) -> &Society {
        &self.society
    }

    /// Re-reads the society document.
    pub async fn refresh(&mut self) -> Result<&Society, AdminError> {
        self.society = load_society(self.store.as_ref(), &self.society.id).await?;
        Ok(&self.society)
    }

    pub async fn update_profile(&mut self, profile: SocietyProfile) -> Result<(), AdminError> {
        let patch = DocumentPatch::new()
            .set("name", profile.name.clone())
            .set("description", profile.description.clone())
            .set("category", profile.category.clone());
        self.store
            .update_document(Society::COLLECTION, &self.society.id, patch)
            .await?;
        self.society.name = profile.name;
        self.society.description = profile.description;
        self.society.category = profile.category;
        Ok(())
    }

    /// Uploads a new logo for the society and returns its URL.
    pub async fn replace_logo(&mut self, bytes: Vec<u8>) -> Result<String, AdminError> {
        let path = format!("societies/logos/{}", self.society.id);
        let url = self.blobs.upload(&path, bytes).await?;
        self.store
            .update_document(Society::COLLECTION, &self.society.id, DocumentPatch::new().set("logo", url.clone()))
            .await?;
        self.society.logo = Some(url.clone());
        Ok(url)
    }

    fn check_owner<T: OwnedRecord>(&self, record: &T) -> Result<(), AdminError> {
        if record.society() != self.society.id {
            return Err(AdminError::NotOwned {
                collection: T::COLLECTION,
                id: record.id().to_string(),
                society_id: self.society.id.clone(),
            });
        }
        Ok(())
    }

    async fn fetch_snapshot<T: OwnedRecord>(&self, id: &str) -> Result<(DocumentSnapshot, T), AdminError> {
        let snapshot = self
            .store
            .get_document(T::COLLECTION, id)
            .await?
            .ok_or_else(|| StoreError::not_found(T::COLLECTION, id))?;
        let record: T = decode_record(&snapshot)?;
        self.check_owner(&record)?;
        Ok((snapshot, record))
    }

    /// Reads an owned record, rejecting records of other societies.
    pub async fn fetch<T: OwnedRecord>(&self, id: &str) -> Result<T, AdminError> {
        let (_, record) = self.fetch_snapshot(id).await?;
        Ok(record)
    }

    /// Reads every record the society lists for `T`, in list order. Dangling ids and records
    /// that fail to decode are skipped.
    pub async fn list<T: OwnedRecord>(&self) -> Result<Vec<T>, AdminError> {
        let ids = T::listed(&self.society);
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(snapshot) = self.store.get_document(T::COLLECTION, id).await? else {
                warn!(collection = T::COLLECTION, id = %id, "society lists a missing record");
                continue;
            };
            match decode_record(&snapshot) {
                Ok(record) => records.push(record),
                Err(error) => warn!(collection = T::COLLECTION, id = %id, %error, "skipping invalid record"),
            }
        }
        Ok(records)
    }

    /// Stores a new record and appends its id to the society's list. Returns the stored record.
    pub async fn create<T: OwnedRecord>(&mut self, mut record: T) -> Result<T, AdminError> {
        self.check_owner(&record)?;
        let body = encode_record(&record)?;
        let id = self.store.add_document(T::COLLECTION, body).await?;
        record.set_id(id.clone());
        self.store
            .update_document(
                Society::COLLECTION,
                &self.society.id,
                DocumentPatch::new().array_append(T::SOCIETY_LIST, id.clone()),
            )
            .await?;
        T::listed_mut(&mut self.society).push(id.clone());
        info!(collection = T::COLLECTION, id = %id, society_id = %self.society.id, "record created");
        Ok(record)
    }

    /// Replaces every field of an existing owned record. Stored fields the record leaves out are
    /// deleted.
    pub async fn update<T: OwnedRecord>(&self, record: &T) -> Result<(), AdminError> {
        self.check_owner(record)?;
        let (stored, _) = self.fetch_snapshot::<T>(record.id()).await?;
        let body = encode_record(record)?;
        let cleared: Vec<String> = stored
            .data
            .keys()
            .filter(|field| !body.contains_key(field.as_str()))
            .cloned()
            .collect();
        let patch = cleared
            .into_iter()
            .fold(DocumentPatch::from_document(body), |patch, field| patch.delete_field(field));
        self.store.update_document(T::COLLECTION, record.id(), patch).await?;
        Ok(())
    }

    /// Deletes the record's image blob, the record, and its entry on the society's list.
    pub async fn delete<T: OwnedRecord>(&mut self, id: &str) -> Result<(), AdminError> {
        let record: T = self.fetch(id).await?;
        if let Some(image) = record.image() {
            match self.blobs.delete(image).await {
                Ok(()) => {}
                Err(StorageError::NotFound { path }) => {
                    warn!(collection = T::COLLECTION, id, path = %path, "image already gone");
                }
                Err(error) => return Err(error.into()),
            }
        }
        self.store.delete_document(T::COLLECTION, id).await?;
        self.store
            .update_document(
                Society::COLLECTION,
                &self.society.id,
                DocumentPatch::new().array_remove(T::SOCIETY_LIST, id),
            )
            .await?;
        T::listed_mut(&mut self.society).retain(|listed| listed != id);
        info!(collection = T::COLLECTION, id, society_id = %self.society.id, "record deleted");
        Ok(())
    }

    /// Uploads a new image for an owned record, points the record at it and returns its URL.
    pub async fn replace_image<T: OwnedRecord>(&self, id: &str, bytes: Vec<u8>) -> Result<String, AdminError> {
        self.fetch::<T>(id).await?;
        let path = format!("{}/{}", T::IMAGE_FOLDER, id);
        let url = self.blobs.upload(&path, bytes).await?;
        self.store
            .update_document(T::COLLECTION, id, DocumentPatch::new().set(T::IMAGE_FIELD, url.clone()))
            .await?;
        Ok(url)
    }
}

async fn load_society(store: &dyn DocumentStore, society_id: &str) -> Result<Society, AdminError> {
    let snapshot = store
        .get_document(Society::COLLECTION, society_id)
        .await?
        .ok_or_else(|| AdminError::SocietyNotFound {
            society_id: society_id.to_string(),
        })?;
    Ok(decode_record(&snapshot)?)
}
