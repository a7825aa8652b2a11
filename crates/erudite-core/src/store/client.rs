use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;

use super::config::StoreConfig;
use super::connector::{StoreConnector, StoreError, StoreResult};
use super::schema::{ClassSchema, PropertySchema, StoreSchema};
use crate::graph::{EntryId, EntryRef};

/// HTTP connector for a Weaviate instance (REST API v1).
pub struct WeaviateClient {
    config: StoreConfig,
    base: Url,
    inner: Client,
}

impl WeaviateClient {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let mut base = config
            .base_url()
            .map_err(|e| StoreError::InvalidUrl(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let inner = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(concat!("erudite/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::Unreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, base, inner })
    }

    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> StoreResult<Url> {
        self.base
            .join(path)
            .map_err(|e| StoreError::InvalidUrl(format!("{path}: {e}")))
    }

    fn request(&self, method: Method, path: &str) -> StoreResult<RequestBuilder> {
        let url = self.endpoint(path)?;
        let mut builder = self.inner.request(method, url);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder) -> StoreResult<Response> {
        builder.send().await.map_err(transport_error)
    }

    /// Send and turn any non-success status into an error.
    async fn execute(&self, builder: RequestBuilder) -> StoreResult<Response> {
        let response = self.send(builder).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }

    async fn exists(&self, class_name: &str, id: EntryId) -> StoreResult<bool> {
        let builder = self.request(Method::HEAD, &object_path(class_name, id))?;
        let response = self.send(builder).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(status_error(s, String::new())),
        }
    }

    async fn existing_schema(&self) -> StoreResult<HashMap<String, HashSet<String>>> {
        let response = self.execute(self.request(Method::GET, "v1/schema")?).await?;
        let dump: SchemaDump = response
            .json()
            .await
            .map_err(|e| StoreError::Transient(format!("unreadable schema response: {e}")))?;

        Ok(dump
            .classes
            .into_iter()
            .map(|c| (c.class, c.properties.into_iter().map(|p| p.name).collect()))
            .collect())
    }
}

#[async_trait]
impl StoreConnector for WeaviateClient {
    async fn ping(&self) -> StoreResult<()> {
        self.execute(self.request(Method::GET, "v1/.well-known/ready")?).await?;
        tracing::debug!(url = %self.base, "Store is ready");
        Ok(())
    }

    async fn ensure_schema(&self, schema: &StoreSchema) -> StoreResult<()> {
        let mut existing = self.existing_schema().await?;

        // Classes first with plain properties only, so every reference
        // target exists by the time reference properties are added.
        for class in &schema.classes {
            if existing.contains_key(&class.name) {
                continue;
            }
            tracing::info!(class = %class.name, "Creating class");
            self.execute(self.request(Method::POST, "v1/schema")?.json(&class_body(class)))
                .await?;
            existing.insert(
                class.name.clone(),
                class.primitive_properties().map(|p| p.name.clone()).collect(),
            );
        }

        for class in &schema.classes {
            let present = existing.get(&class.name);
            for property in class.reference_properties() {
                if present.is_some_and(|names| names.contains(&property.name)) {
                    continue;
                }
                tracing::info!(class = %class.name, property = %property.name, "Adding reference property");
                let path = format!("v1/schema/{}/properties", class.name);
                self.execute(self.request(Method::POST, &path)?.json(&property_body(property)))
                    .await?;
            }
        }

        Ok(())
    }

    async fn upsert(&self, class_name: &str, id: EntryId, data: &Map<String, Value>) -> StoreResult<()> {
        let body = object_body(class_name, id, data);

        let builder = if self.exists(class_name, id).await? {
            self.request(Method::PUT, &object_path(class_name, id))?
        } else {
            self.request(Method::POST, "v1/objects")?
        };

        self.execute(builder.json(&body)).await?;
        Ok(())
    }

    async fn link(&self, from: &EntryRef, property: &str, to: &EntryRef) -> StoreResult<()> {
        let path = format!("{}/references/{property}", object_path(&from.class_name, from.id));
        self.execute(self.request(Method::POST, &path)?.json(&json!({ "beacon": beacon(to) })))
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SchemaDump {
    #[serde(default)]
    classes: Vec<ClassDump>,
}

#[derive(Debug, Deserialize)]
struct ClassDump {
    class: String,
    #[serde(default)]
    properties: Vec<PropertyDump>,
}

#[derive(Debug, Deserialize)]
struct PropertyDump {
    name: String,
}

fn object_path(class_name: &str, id: EntryId) -> String {
    format!("v1/objects/{class_name}/{id}")
}

fn beacon(target: &EntryRef) -> String {
    format!("weaviate://localhost/{}/{}", target.class_name, target.id)
}

fn object_body(class_name: &str, id: EntryId, data: &Map<String, Value>) -> Value {
    json!({
        "class": class_name,
        "id": id.to_string(),
        "properties": data,
    })
}

fn class_body(class: &ClassSchema) -> Value {
    json!({
        "class": class.name,
        "properties": class.primitive_properties().map(property_body).collect::<Vec<_>>(),
    })
}

fn property_body(property: &PropertySchema) -> Value {
    let mut body = json!({
        "name": property.name,
        "dataType": [property.kind.data_type()],
    });
    if let (Some(description), Some(map)) = (&property.description, body.as_object_mut()) {
        map.insert("description".to_string(), Value::from(description.as_str()));
    }
    body
}

fn transport_error(error: reqwest::Error) -> StoreError {
    let message = error.to_string();
    if error.is_timeout() {
        StoreError::Timeout(message)
    } else if error.is_connect() {
        StoreError::Unreachable(message)
    } else if error.is_decode() || error.is_body() {
        StoreError::Transient(message)
    } else {
        StoreError::Unreachable(message)
    }
}

fn status_error(status: StatusCode, body: String) -> StoreError {
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("no reason").to_string()
    } else {
        body
    };

    if status.is_server_error() {
        StoreError::Transient(format!("{status}: {message}"))
    } else {
        StoreError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{assign, BOOK, CHAPTER};

    fn entry_ref(class_name: &str) -> EntryRef {
        EntryRef {
            class_name: class_name.to_string(),
            id: assign(class_name, &Map::new()),
        }
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = WeaviateClient::new(StoreConfig::new("http://store.local:8080/weaviate")).unwrap();
        let url = client.endpoint("v1/schema").unwrap();
        assert_eq!(url.as_str(), "http://store.local:8080/weaviate/v1/schema");

        let client = WeaviateClient::new(StoreConfig::new("http://store.local:8080")).unwrap();
        let url = client.endpoint("v1/.well-known/ready").unwrap();
        assert_eq!(url.as_str(), "http://store.local:8080/v1/.well-known/ready");
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(matches!(
            WeaviateClient::new(StoreConfig::new("file:///tmp/store")),
            Err(StoreError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_beacon_format() {
        let chapter = entry_ref(CHAPTER);
        assert_eq!(beacon(&chapter), format!("weaviate://localhost/Chapter/{}", chapter.id));
    }

    #[test]
    fn test_object_body() {
        let book = entry_ref(BOOK);
        let mut data = Map::new();
        data.insert("title".into(), Value::from("Moby-Dick"));

        let body = object_body(BOOK, book.id, &data);
        assert_eq!(body["class"], "Book");
        assert_eq!(body["id"], book.id.to_string());
        assert_eq!(body["properties"]["title"], "Moby-Dick");
    }

    #[test]
    fn test_class_body_has_no_references() {
        let schema = StoreSchema::gutenberg();
        let body = class_body(schema.class(BOOK).unwrap());

        let names: Vec<&str> = body["properties"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["title", "author"]);
        assert_eq!(body["properties"][1]["dataType"][0], "text[]");
    }

    #[test]
    fn test_reference_property_body() {
        let schema = StoreSchema::gutenberg();
        let chapter = schema.class(CHAPTER).unwrap();
        let contained_in = chapter.property("containedIn").unwrap();

        let body = property_body(contained_in);
        assert_eq!(body["dataType"][0], "Book");
        assert!(body["description"].is_string());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, String::new()),
            StoreError::Transient(_)
        ));
        assert!(matches!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, "bad property".into()),
            StoreError::Rejected { status: 422, ref message } if message == "bad property"
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "  ".into()),
            StoreError::Rejected { status: 401, ref message } if message == "Unauthorized"
        ));
    }

    #[tokio::test]
    async fn test_ping_closed_port_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = WeaviateClient::new(StoreConfig::new(format!("http://127.0.0.1:{port}"))).unwrap();
        let result = client.ping().await;

        assert!(matches!(result, Err(StoreError::Unreachable(_))), "{result:?}");
    }
}
