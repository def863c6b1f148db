//! In-memory backends and a spawned server for API tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use ondeu_api::{router, AdminCredentials, AppState, Backends, ServerConfig};
use ondeu_core::defaults::{APPLICATION_CLIENT_ID, ROOT_TREE_ID};
use ondeu_core::{
    ClientRole, CreateTreeRequest, Document, DocumentFilterField, DocumentRepository, Error,
    NewDocument, ObjectStorage, Result, TreeNode, TreeRepository, UpdateDocumentRequest,
    UpdateTreeRequest,
};
use ondeu_identity::MockIdentityProvider;

pub const ALICE: &str = "alice";
pub const ALICE_TOKEN: &str = "alice-token";
pub const BOB: &str = "bob";
pub const BOB_TOKEN: &str = "bob-token";
pub const GUEST_TOKEN: &str = "guest-token";
pub const ADMIN_CLIENT: &str = "ondeu-admin";
pub const ADMIN_SECRET: &str = "admin-secret";

// =============================================================================
// REPOSITORIES
// =============================================================================

#[derive(Default)]
struct Tables {
    next_tree_id: i64,
    next_document_id: i64,
    trees: HashMap<i64, TreeNode>,
    documents: HashMap<i64, Document>,
    /// (tree_id, document_id)
    tree_documents: HashSet<(i64, i64)>,
}

/// Trees and documents sharing one lock, so links stay consistent.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn link_count(&self, tree_id: i64) -> usize {
        let tables = self.tables.lock().unwrap();
        tables
            .tree_documents
            .iter()
            .filter(|(t, _)| *t == tree_id)
            .count()
    }

    pub fn document_count(&self) -> usize {
        self.tables.lock().unwrap().documents.len()
    }

    fn linked(tables: &Tables, user_id: &str, tree_id: i64, id: i64) -> Result<Document> {
        if !tables.tree_documents.contains(&(tree_id, id)) {
            return Err(Error::DocumentNotFound(id));
        }
        tables
            .documents
            .get(&id)
            .filter(|d| d.user_id == user_id)
            .map(|d| Document {
                tree_id,
                ..d.clone()
            })
            .ok_or(Error::DocumentNotFound(id))
    }
}

#[async_trait]
impl TreeRepository for MemoryStore {
    async fn create(&self, user_id: &str, req: CreateTreeRequest) -> Result<TreeNode> {
        req.validate()?;
        let mut tables = self.tables.lock().unwrap();
        tables.next_tree_id += 1;
        let now = Utc::now();
        let node = TreeNode {
            id: tables.next_tree_id,
            user_id: user_id.to_string(),
            parent_id: req.parent_id,
            created_at: now,
            updated_at: now,
            name: req.name,
            role: req.role,
            template: req.template,
            group: req.group,
            documents: Vec::new(),
        };
        tables.trees.insert(node.id, node.clone());
        Ok(node)
    }

    async fn get(&self, user_id: &str, id: i64) -> Result<TreeNode> {
        let tables = self.tables.lock().unwrap();
        tables
            .trees
            .get(&id)
            .filter(|n| n.user_id == user_id)
            .cloned()
            .ok_or(Error::TreeNotFound(id))
    }

    async fn list_descendants(&self, user_id: &str, start_id: i64) -> Result<Vec<TreeNode>> {
        let tables = self.tables.lock().unwrap();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start_id]);
        let mut out = Vec::new();

        while let Some(parent) = queue.pop_front() {
            for node in tables.trees.values() {
                if node.parent_id == parent && node.user_id == user_id && seen.insert(node.id) {
                    out.push(node.clone());
                    queue.push_back(node.id);
                }
            }
        }
        Ok(out)
    }

    async fn update(&self, user_id: &str, id: i64, req: UpdateTreeRequest) -> Result<TreeNode> {
        let mut tables = self.tables.lock().unwrap();
        let node = tables
            .trees
            .get_mut(&id)
            .filter(|n| n.user_id == user_id)
            .ok_or(Error::TreeNotFound(id))?;
        node.name = req.name;
        node.role = req.role;
        node.template = req.template;
        node.group = req.group;
        node.updated_at = Utc::now();
        Ok(node.clone())
    }

    async fn delete(&self, user_id: &str, id: i64) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let owned = tables
            .trees
            .get(&id)
            .map_or(false, |n| n.user_id == user_id);
        if !owned {
            return Err(Error::TreeNotFound(id));
        }
        tables.trees.remove(&id);
        tables.tree_documents.retain(|(t, _)| *t != id);
        Ok(())
    }
}

#[async_trait]
impl DocumentRepository for MemoryStore {
    async fn create(&self, user_id: &str, doc: NewDocument) -> Result<Document> {
        let mut tables = self.tables.lock().unwrap();
        let owned = tables
            .trees
            .get(&doc.tree_id)
            .map_or(false, |n| n.user_id == user_id);
        if !owned {
            return Err(Error::TreeNotFound(doc.tree_id));
        }

        tables.next_document_id += 1;
        let now = Utc::now();
        let stored = Document {
            id: tables.next_document_id,
            user_id: user_id.to_string(),
            tree_id: doc.tree_id,
            created_at: now,
            updated_at: now,
            name: doc.name,
            extension: doc.extension,
            size: doc.size,
            content_type: doc.content_type,
            path: doc.path,
            template: doc.template,
            share_link: None,
            content: None,
        };
        tables.documents.insert(stored.id, stored.clone());
        tables.tree_documents.insert((doc.tree_id, stored.id));
        Ok(stored)
    }

    async fn get(&self, user_id: &str, tree_id: i64, id: i64) -> Result<Document> {
        let tables = self.tables.lock().unwrap();
        Self::linked(&tables, user_id, tree_id, id)
    }

    async fn update(
        &self,
        user_id: &str,
        tree_id: i64,
        id: i64,
        req: UpdateDocumentRequest,
    ) -> Result<Document> {
        let mut tables = self.tables.lock().unwrap();
        Self::linked(&tables, user_id, tree_id, id)?;
        let doc = tables
            .documents
            .get_mut(&id)
            .ok_or(Error::DocumentNotFound(id))?;
        if let Some(name) = req.name {
            doc.name = name;
        }
        if let Some(template) = req.template {
            doc.template = template;
        }
        doc.updated_at = Utc::now();
        Ok(Document {
            tree_id,
            ..doc.clone()
        })
    }

    async fn delete(&self, user_id: &str, tree_id: i64, id: i64) -> Result<Document> {
        let mut tables = self.tables.lock().unwrap();
        let doc = Self::linked(&tables, user_id, tree_id, id)?;
        tables.tree_documents.remove(&(tree_id, id));
        tables.documents.remove(&id);
        Ok(doc)
    }

    async fn list_by_trees(&self, tree_ids: &[i64]) -> Result<Vec<Document>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .tree_documents
            .iter()
            .filter(|(t, _)| tree_ids.contains(t))
            .filter_map(|(t, d)| {
                tables.documents.get(d).map(|doc| Document {
                    tree_id: *t,
                    ..doc.clone()
                })
            })
            .collect())
    }

    async fn list_by_groups(&self, _group_ids: &[i64]) -> Result<Vec<Document>> {
        Ok(Vec::new())
    }

    async fn filter(
        &self,
        user_id: &str,
        field: DocumentFilterField,
        pattern: &str,
    ) -> Result<Vec<Document>> {
        let tables = self.tables.lock().unwrap();
        let needle = pattern.to_lowercase();
        Ok(tables
            .documents
            .values()
            .filter(|d| d.user_id == user_id)
            .filter(|d| {
                let value = match field {
                    DocumentFilterField::Name => &d.name,
                    DocumentFilterField::ContentType => &d.content_type,
                    DocumentFilterField::Extension => &d.extension,
                };
                value.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }
}

// =============================================================================
// OBJECT STORAGE
// =============================================================================

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    fail_puts: AtomicBool,
}

impl MemoryStorage {
    pub fn object(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::Storage("bucket unavailable".to_string()));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.object(key)
            .map(|(data, _)| data)
            .ok_or_else(|| Error::Storage(format!("no such key {}", key)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String> {
        Ok(format!(
            "https://spaces.test/bucket/{}?X-Amz-Expires={}",
            key,
            ttl.as_secs()
        ))
    }
}

// =============================================================================
// SERVER
// =============================================================================

pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<MemoryStorage>,
    pub identity: Arc<MockIdentityProvider>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(token)
    }

    pub fn post(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(token)
    }

    pub fn put(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.put(self.url(path)).bearer_auth(token)
    }

    pub fn delete(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.delete(self.url(path)).bearer_auth(token)
    }

    /// Create a tree node through the API and return its id.
    pub async fn create_tree(&self, token: &str, name: &str, parent_id: i64) -> i64 {
        let resp = self
            .post("/api/v1/tree", token)
            .json(&serde_json::json!({
                "name": name,
                "role": "student",
                "parentID": parent_id,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "create tree {}", name);
        let body: serde_json::Value = resp.json().await.unwrap();
        body["id"].as_i64().unwrap()
    }

    /// Upload a file through the API and return the response body.
    pub async fn upload(
        &self,
        token: &str,
        tree_id: i64,
        file_name: &str,
        content_type: &str,
        data: &[u8],
    ) -> reqwest::Response {
        let part = reqwest::multipart::Part::bytes(data.to_vec())
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .unwrap();
        let form = reqwest::multipart::Form::new().part("file", part);
        self.post(&format!("/api/v1/tree/{}/document", tree_id), token)
            .multipart(form)
            .send()
            .await
            .unwrap()
    }
}

fn role(name: &str) -> ClientRole {
    ClientRole {
        id: format!("role-{}", name),
        name: name.to_string(),
        description: None,
        composite: false,
        client_role: true,
        container_id: Some("front-uuid".to_string()),
    }
}

pub async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::default());
    let storage = Arc::new(MemoryStorage::default());
    let identity = Arc::new(MockIdentityProvider::new());

    identity.insert_user_token(ALICE_TOKEN, ALICE, &["student"]);
    identity.insert_user_token(BOB_TOKEN, BOB, &["manager"]);
    identity.insert_user_token(GUEST_TOKEN, "guest", &["viewer"]);
    identity.add_client(ADMIN_CLIENT, ADMIN_SECRET, 300);
    identity.set_client_roles(
        APPLICATION_CLIENT_ID,
        vec![role("admin"), role("manager"), role("student")],
    );

    let state = AppState::new(Backends {
        trees: store.clone(),
        documents: store.clone(),
        storage: storage.clone(),
        identity: identity.clone(),
        refresher: None,
        admin: AdminCredentials::new(ADMIN_CLIENT, ADMIN_SECRET),
        application_client_id: APPLICATION_CLIENT_ID.to_string(),
    });
    let app = router(state, &ServerConfig::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        base_url: format!("http://{}", addr),
        client: reqwest::Client::new(),
        store,
        storage,
        identity,
    }
}

pub const ROOT: i64 = ROOT_TREE_ID;
