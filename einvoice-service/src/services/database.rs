use crate::error::InvoiceError;
use crate::models::{
    DeliveryStatus, DeliveryUpdate, Invoice, InvoiceFilter, ReservationDocument,
    ReservationSnapshot, ReservationSummary,
};
use crate::services::reservations::ReservationReader;
use crate::services::store::InvoiceStore;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;
use std::collections::HashMap;

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct InvoiceDb {
    client: MongoClient,
    db: Database,
}

impl InvoiceDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for einvoice-service");

        // Default index names, so indexes the booking site already built on
        // the same keys are reused instead of conflicting.
        let indexes = [
            // Backs the sequential numbering: a lost numbering race fails here.
            index(doc! { "number": 1 }, true),
            index(doc! { "createdAt": -1 }, false),
            index(doc! { "aeatStatus": 1 }, false),
            index(doc! { "reservation": 1 }, false),
        ];

        self.invoices()
            .create_indexes(indexes, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create invoice indexes: {}", e);
                AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
            })?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    pub fn invoices(&self) -> Collection<Invoice> {
        self.db.collection("invoices")
    }

    pub fn reservations(&self) -> Collection<ReservationDocument> {
        self.db.collection("reservations")
    }

    pub fn invoice_store(&self) -> MongoInvoiceStore {
        MongoInvoiceStore { db: self.clone() }
    }

    pub fn reservation_reader(&self) -> MongoReservationReader {
        MongoReservationReader { db: self.clone() }
    }

    async fn ping(&self) -> Result<(), mongodb::error::Error> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map(|_| ())
    }
}

fn index(keys: Document, unique: bool) -> IndexModel {
    let options = unique.then(|| IndexOptions::builder().unique(true).build());
    IndexModel::builder().keys(keys).options(options).build()
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

/// Escape user input for use inside a `$regex` pattern.
fn escape_regex(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn filter_document(filter: &InvoiceFilter) -> Document {
    let mut query = doc! {};

    if let Some(status) = filter.status {
        query.insert("aeatStatus", status.as_str());
    }

    if let Some(since) = filter.issued_since {
        query.insert("date", doc! { "$gte": BsonDateTime::from_chrono(since) });
    }

    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = escape_regex(term);
        query.insert(
            "$or",
            vec![
                doc! { "number": { "$regex": pattern.as_str(), "$options": "i" } },
                doc! { "clientName": { "$regex": pattern.as_str(), "$options": "i" } },
                doc! { "clientNIF": { "$regex": pattern.as_str(), "$options": "i" } },
            ],
        );
    }

    query
}

/// Highest number by numeric value. Numbers are digit strings, so a longer
/// one is larger and equal lengths compare lexically.
fn last_number_pipeline() -> Vec<Document> {
    vec![
        doc! { "$project": { "number": 1, "width": { "$strLenCP": "$number" } } },
        doc! { "$sort": { "width": -1, "number": -1 } },
        doc! { "$limit": 1 },
    ]
}

fn delivery_document(update: &DeliveryUpdate) -> Document {
    let mut set = doc! {
        "aeatStatus": update.status.as_str(),
        "aeatResponse": update.narrative.as_str(),
        "updatedAt": BsonDateTime::now(),
    };
    let mut unset = doc! {};

    for (field, value) in [
        ("pdfUrl", &update.artifacts.pdf_url),
        ("xmlUrl", &update.artifacts.xml_url),
        ("qrUrl", &update.artifacts.qr_url),
    ] {
        match value {
            Some(url) => {
                set.insert(field, url.as_str());
            }
            None => {
                unset.insert(field, "");
            }
        }
    }

    let mut document = doc! { "$set": set };
    if !unset.is_empty() {
        document.insert("$unset", unset);
    }
    document
}

#[derive(Clone)]
pub struct MongoInvoiceStore {
    db: InvoiceDb,
}

#[async_trait]
impl InvoiceStore for MongoInvoiceStore {
    async fn insert(&self, invoice: &Invoice) -> Result<(), InvoiceError> {
        self.db
            .invoices()
            .insert_one(invoice, None)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    tracing::warn!(number = %invoice.number, "Invoice number collision");
                    InvoiceError::DuplicateNumber(invoice.number.clone())
                } else {
                    tracing::error!("Failed to insert invoice: {}", e);
                    InvoiceError::from(e)
                }
            })?;
        Ok(())
    }

    async fn find_by_id(&self, invoice_id: &str) -> Result<Option<Invoice>, InvoiceError> {
        // Ids that are not ObjectIds cannot exist in the collection.
        let Ok(oid) = ObjectId::parse_str(invoice_id) else {
            return Ok(None);
        };
        self.db
            .invoices()
            .find_one(doc! { "_id": oid }, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to find invoice: {}", e);
                InvoiceError::from(e)
            })
    }

    async fn last_number(&self) -> Result<Option<String>, InvoiceError> {
        let mut cursor = self
            .db
            .invoices()
            .aggregate(last_number_pipeline(), None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to read last invoice number: {}", e);
                InvoiceError::from(e)
            })?;

        let Some(last) = cursor.try_next().await? else {
            return Ok(None);
        };
        let number = last.get_str("number").map_err(|e| {
            InvoiceError::Storage(anyhow::anyhow!("invoice without a string number: {}", e))
        })?;
        Ok(Some(number.to_string()))
    }

    async fn save_delivery(
        &self,
        invoice_id: &str,
        expected: Option<DeliveryStatus>,
        update: &DeliveryUpdate,
    ) -> Result<Option<Invoice>, InvoiceError> {
        let Ok(oid) = ObjectId::parse_str(invoice_id) else {
            return Ok(None);
        };
        let mut filter = doc! { "_id": oid };
        if let Some(status) = expected {
            filter.insert("aeatStatus", status.as_str());
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        self.db
            .invoices()
            .find_one_and_update(filter, delivery_document(update), options)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update invoice delivery status: {}", e);
                InvoiceError::from(e)
            })
    }

    async fn list(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, InvoiceError> {
        let find_options = FindOptions::builder()
            .sort(doc! { "createdAt": -1, "number": -1 })
            .build();

        let cursor = self
            .db
            .invoices()
            .find(filter_document(filter), find_options)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list invoices: {}", e);
                InvoiceError::from(e)
            })?;

        cursor.try_collect().await.map_err(|e| {
            tracing::error!("Failed to collect invoices: {}", e);
            InvoiceError::from(e)
        })
    }

    async fn list_for_reservation(
        &self,
        reservation_id: &str,
    ) -> Result<Vec<Invoice>, InvoiceError> {
        let Ok(oid) = ObjectId::parse_str(reservation_id) else {
            return Ok(Vec::new());
        };
        let find_options = FindOptions::builder()
            .sort(doc! { "createdAt": -1, "number": -1 })
            .build();

        let cursor = self
            .db
            .invoices()
            .find(doc! { "reservation": oid }, find_options)
            .await?;

        Ok(cursor.try_collect().await?)
    }

    async fn health_check(&self) -> Result<(), InvoiceError> {
        self.db.ping().await.map_err(|e| {
            tracing::error!("MongoDB health check failed: {}", e);
            InvoiceError::from(e)
        })
    }
}

#[derive(Clone)]
pub struct MongoReservationReader {
    db: InvoiceDb,
}

#[async_trait]
impl ReservationReader for MongoReservationReader {
    async fn snapshot(
        &self,
        reservation_id: &str,
    ) -> Result<Option<ReservationSnapshot>, InvoiceError> {
        // Ids that are not ObjectIds cannot exist in the collection.
        let Ok(oid) = ObjectId::parse_str(reservation_id) else {
            return Ok(None);
        };

        let reservation = self
            .db
            .reservations()
            .find_one(doc! { "_id": oid }, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to read reservation: {}", e);
                InvoiceError::from(e)
            })?;

        reservation
            .map(ReservationDocument::into_snapshot)
            .transpose()
    }

    async fn summaries(
        &self,
        reservation_ids: &[String],
    ) -> Result<HashMap<String, ReservationSummary>, InvoiceError> {
        let oids: Vec<ObjectId> = reservation_ids
            .iter()
            .filter_map(|id| ObjectId::parse_str(id).ok())
            .collect();
        if oids.is_empty() {
            return Ok(HashMap::new());
        }

        let cursor = self
            .db
            .reservations()
            .find(doc! { "_id": { "$in": oids } }, None)
            .await?;
        let reservations: Vec<ReservationDocument> = cursor.try_collect().await?;

        // A reservation that cannot be priced is left out of listings
        // instead of failing them.
        Ok(reservations
            .into_iter()
            .filter_map(|r| match r.into_snapshot() {
                Ok(snapshot) => Some((snapshot.reservation_id.clone(), snapshot.summary())),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping reservation summary");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Artifacts;

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert_eq!(escape_regex("a.b*c"), "a\\.b\\*c");
        assert_eq!(escape_regex("000123"), "000123");
    }

    #[test]
    fn missing_artifacts_are_unset() {
        let update = DeliveryUpdate {
            status: DeliveryStatus::Sent,
            narrative: "Sent via AEAT".to_string(),
            artifacts: Artifacts {
                pdf_url: Some("https://aeat/pdf".to_string()),
                xml_url: None,
                qr_url: None,
            },
        };

        let document = delivery_document(&update);
        let set = document.get_document("$set").unwrap();
        let unset = document.get_document("$unset").unwrap();

        assert_eq!(set.get_str("aeatStatus").unwrap(), "sent");
        assert_eq!(set.get_str("aeatResponse").unwrap(), "Sent via AEAT");
        assert_eq!(set.get_str("pdfUrl").unwrap(), "https://aeat/pdf");
        assert!(unset.contains_key("xmlUrl"));
        assert!(unset.contains_key("qrUrl"));
        assert!(!unset.contains_key("pdfUrl"));
    }

    #[test]
    fn filter_document_includes_each_criterion() {
        let filter = InvoiceFilter {
            search: Some("b1234".to_string()),
            status: Some(DeliveryStatus::Error),
            issued_since: Some(chrono::Utc::now()),
        };
        let query = filter_document(&filter);
        assert_eq!(query.get_str("aeatStatus").unwrap(), "error");
        assert!(query.contains_key("date"));
        assert_eq!(query.get_array("$or").unwrap().len(), 3);
    }

    #[test]
    fn last_number_sorts_by_width_before_digits() {
        let pipeline = last_number_pipeline();
        let sort = pipeline[1].get_document("$sort").unwrap();
        let keys: Vec<&str> = sort.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["width", "number"]);
        assert_eq!(pipeline[2].get_i32("$limit").unwrap(), 1);
    }
}
