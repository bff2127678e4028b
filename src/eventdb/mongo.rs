// MongoDB adapter for the event store seam.

use mongodb::bson::{doc, to_document, Bson, DateTime as BsonDateTime, Document};
use mongodb::{Client, Collection};
use serde_json::Value;

use super::{EventDbError, EventStore, StoredEvent};

pub struct MongoEventStore {
    events: Collection<Document>,
    contents: Collection<Document>,
}

impl MongoEventStore {
    /// Connect and bind the `events` index collection and the per-typename
    /// `events_{typename}` content collection.
    pub async fn connect(host: &str, db_name: &str, typename: &str) -> Result<Self, EventDbError> {
        let client = Client::with_uri_str(host)
            .await
            .map_err(|e| EventDbError::Connect(format!("{host}: {e}")))?;
        let db = client.database(db_name);
        Ok(Self {
            events: db.collection("events"),
            contents: db.collection(&format!("events_{typename}")),
        })
    }
}

fn bson_id_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}

#[async_trait::async_trait]
impl EventStore for MongoEventStore {
    async fn insert_contents(&self, contents: Vec<Value>) -> Result<Vec<String>, EventDbError> {
        if contents.is_empty() {
            return Ok(Vec::new());
        }
        let docs: Result<Vec<Document>, _> = contents.iter().map(to_document).collect();
        let docs = docs.map_err(|e| EventDbError::Insert(format!("content is not a document: {e}")))?;
        let count = docs.len();

        let result = self
            .contents
            .insert_many(docs)
            .await
            .map_err(|e| EventDbError::Insert(e.to_string()))?;

        // inserted_ids is keyed by input index; return ids in input order.
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            match result.inserted_ids.get(&i) {
                Some(id) => ids.push(bson_id_string(id)),
                None => return Err(EventDbError::Insert(format!("no id returned for content #{i}"))),
            }
        }
        Ok(ids)
    }

    async fn insert_events(&self, events: Vec<StoredEvent>) -> Result<(), EventDbError> {
        if events.is_empty() {
            return Ok(());
        }
        let docs: Vec<Document> = events
            .iter()
            .map(|event| {
                doc! {
                    "analyzerId": &event.analyzer_id,
                    "timestamp": event.timestamp,
                    "type": &event.kind,
                    "appName": &event.app_name,
                    "content": &event.content,
                    "date": BsonDateTime::from_millis(event.date.timestamp_millis()),
                }
            })
            .collect();
        self.events
            .insert_many(docs)
            .await
            .map_err(|e| EventDbError::Insert(e.to_string()))?;
        Ok(())
    }
}
