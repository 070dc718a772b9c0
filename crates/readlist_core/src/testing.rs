//! In-memory record store used by the unit tests.
use crate::errors::ClientError;
use crate::remote::{
    AuthRecord, Collection, FileUpload, Filter, ListQuery, RecordPage, RecordStore, UserRecord,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    records: HashMap<Collection, Vec<Value>>,
    next_id: u64,
    failures: VecDeque<ClientError>,
    passwords: HashMap<String, String>,
    tokens: HashMap<String, String>,
}

impl Inner {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn user(&self, id: &str) -> Option<UserRecord> {
        self.records
            .get(&Collection::Users)?
            .iter()
            .find(|record| record["id"] == id)
            .and_then(|record| serde_json::from_value(record.clone()).ok())
    }

    fn issue_token(&mut self, user: UserRecord) -> AuthRecord {
        let token = self.next_id(&format!("token-{}-", user.id));
        self.tokens.insert(token.clone(), user.id.clone());
        AuthRecord::new(token, user)
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    inner: Mutex<Inner>,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of trait calls made so far, failed ones included.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes the next trait call fail with `error`. Queued failures are consumed in order.
    pub(crate) fn fail_next(&self, error: ClientError) {
        self.lock().failures.push_back(error);
    }

    /// Inserts a record directly, bypassing call counting. Returns its id.
    pub(crate) fn insert(&self, collection: Collection, record: Value) -> String {
        let mut inner = self.lock();
        stamp(&mut inner, collection, record)
    }

    pub(crate) fn records(&self, collection: Collection) -> Vec<Value> {
        self.lock()
            .records
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Registers a user that can log in with `email` / `password`.
    pub(crate) fn add_user(&self, email: &str, password: &str) -> String {
        let mut inner = self.lock();
        let id = stamp(
            &mut inner,
            Collection::Users,
            json!({ "email": email, "name": "Reader", "username": "reader" }),
        );
        inner.passwords.insert(email.to_owned(), password.to_owned());
        id
    }

    /// Issues a valid token for `user_id`, as a successful login would.
    pub(crate) fn token_for(&self, user_id: &str) -> AuthRecord {
        let mut inner = self.lock();
        let user = inner.user(user_id).unwrap_or_else(|| UserRecord {
            id: user_id.to_owned(),
            ..UserRecord::default()
        });
        inner.issue_token(user)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn begin(&self, token: Option<&str>) -> Result<MutexGuard<'_, Inner>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        if let Some(error) = inner.failures.pop_front() {
            return Err(error);
        }
        if let Some(token) = token {
            if !inner.tokens.contains_key(token) {
                return Err(ClientError::Unauthenticated);
            }
        }
        Ok(inner)
    }
}

fn stamp(inner: &mut Inner, collection: Collection, mut record: Value) -> String {
    let id = match record.get("id").and_then(Value::as_str) {
        Some(id) => id.to_owned(),
        None => inner.next_id("rec"),
    };
    let now = Utc::now().format("%Y-%m-%d %H:%M:%S%.3fZ").to_string();
    if let Some(object) = record.as_object_mut() {
        object.insert(String::from("id"), json!(id));
        object.insert(String::from("collectionName"), json!(collection.name()));
        object.entry("created").or_insert_with(|| json!(now));
        object.insert(String::from("updated"), json!(now));
    }
    inner.records.entry(collection).or_default().push(record);
    id
}

fn matches(filter: &Filter, record: &Value) -> bool {
    match filter {
        Filter::Equals(field, value) => record.get(field).and_then(Value::as_str) == Some(value),
        Filter::Contains(field, value) => record
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|text| text.to_lowercase().contains(&value.to_lowercase())),
        Filter::And(left, right) => matches(left, record) && matches(right, record),
        Filter::Or(left, right) => matches(left, record) || matches(right, record),
    }
}

fn not_found() -> ClientError {
    ClientError::NotFound(String::from("The requested resource wasn't found."))
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list(
        &self,
        collection: Collection,
        query: &ListQuery,
        token: Option<&str>,
    ) -> Result<RecordPage, ClientError> {
        let inner = self.begin(token)?;
        let mut matching = inner
            .records
            .get(&collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| query.filter.as_ref().is_none_or(|f| matches(f, record)))
                    .cloned()
                    .collect::<Vec<Value>>()
            })
            .unwrap_or_default();
        if query.sort.as_deref() == Some("-created") {
            matching.reverse();
        }
        let total = matching.len() as u64;
        let skip = (query.page.saturating_sub(1) * query.per_page) as usize;
        let mut items = matching
            .into_iter()
            .skip(skip)
            .take(query.per_page as usize)
            .collect::<Vec<Value>>();

        if let Some(relation) = &query.expand {
            let books = inner
                .records
                .get(&Collection::Books)
                .cloned()
                .unwrap_or_default();
            for item in &mut items {
                let target = item.get(relation.as_str()).cloned();
                if let Some(found) = books
                    .iter()
                    .find(|book| Some(&book["id"]) == target.as_ref())
                {
                    let mut expand = Map::new();
                    expand.insert(relation.clone(), found.clone());
                    item["expand"] = Value::Object(expand);
                }
            }
        }
        Ok(RecordPage::new(query.page, query.per_page, total, items))
    }

    async fn get_one(
        &self,
        collection: Collection,
        id: &str,
        token: Option<&str>,
    ) -> Result<Value, ClientError> {
        let inner = self.begin(token)?;
        inner
            .records
            .get(&collection)
            .and_then(|records| records.iter().find(|record| record["id"] == id))
            .cloned()
            .ok_or_else(not_found)
    }

    async fn create(
        &self,
        collection: Collection,
        body: Value,
        token: Option<&str>,
    ) -> Result<Value, ClientError> {
        let mut inner = self.begin(token)?;
        let mut body = body;
        let password = body
            .as_object_mut()
            .and_then(|object| {
                object.remove("passwordConfirm");
                object.remove("password")
            })
            .and_then(|password| password.as_str().map(str::to_owned));
        let id = stamp(&mut inner, collection, body);
        let created = inner
            .records
            .get(&collection)
            .and_then(|records| records.iter().find(|record| record["id"] == id.as_str()))
            .cloned()
            .ok_or_else(not_found)?;
        if let (Some(password), Some(email)) = (password, created["email"].as_str()) {
            inner.passwords.insert(email.to_owned(), password);
        }
        Ok(created)
    }

    async fn create_with_file(
        &self,
        collection: Collection,
        fields: Map<String, Value>,
        file: FileUpload,
        token: Option<&str>,
    ) -> Result<Value, ClientError> {
        let mut fields = fields;
        fields.insert(file.field, json!(file.file_name));
        self.create(collection, Value::Object(fields), token).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        body: Value,
        token: Option<&str>,
    ) -> Result<Value, ClientError> {
        let mut inner = self.begin(token)?;
        let record = inner
            .records
            .get_mut(&collection)
            .and_then(|records| records.iter_mut().find(|record| record["id"] == id))
            .ok_or_else(not_found)?;
        if let (Some(target), Value::Object(changes)) = (record.as_object_mut(), body) {
            for (key, value) in changes {
                target.insert(key, value);
            }
            target.insert(
                String::from("updated"),
                json!(Utc::now().format("%Y-%m-%d %H:%M:%S%.3fZ").to_string()),
            );
        }
        Ok(record.clone())
    }

    async fn delete(
        &self,
        collection: Collection,
        id: &str,
        token: Option<&str>,
    ) -> Result<(), ClientError> {
        let mut inner = self.begin(token)?;
        let records = inner.records.entry(collection).or_default();
        let before = records.len();
        records.retain(|record| record["id"] != id);
        if records.len() == before {
            return Err(not_found());
        }
        Ok(())
    }

    async fn auth_with_password(
        &self,
        identity: &str,
        password: &str,
    ) -> Result<AuthRecord, ClientError> {
        let mut inner = self.begin(None)?;
        if inner.passwords.get(identity).map(String::as_str) != Some(password) {
            return Err(ClientError::validation("Failed to authenticate."));
        }
        let user = inner
            .records
            .get(&Collection::Users)
            .and_then(|users| users.iter().find(|user| user["email"] == identity))
            .and_then(|user| serde_json::from_value::<UserRecord>(user.clone()).ok())
            .ok_or_else(not_found)?;
        Ok(inner.issue_token(user))
    }

    async fn auth_refresh(&self, token: &str) -> Result<AuthRecord, ClientError> {
        let mut inner = self.begin(None)?;
        let user_id = inner
            .tokens
            .remove(token)
            .ok_or(ClientError::Unauthenticated)?;
        let user = inner.user(&user_id).ok_or(ClientError::Unauthenticated)?;
        Ok(inner.issue_token(user))
    }
}
