use crate::fields::{self, Fields};
use crate::{DocumentStore, StoreError};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use url::Url;
use uuid::Uuid;
use votechain_models::{CandidateIndex, NewPoll, Poll, PollStatus, Role, VoteRecord};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com";

const POLLS: &str = "polls";
const VOTES: &str = "votes";
const USERS: &str = "users";

#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub api_key: Option<String>,
    pub base_url: String,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl Document {
    fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    fn fields(&self) -> Fields<'_> {
        Fields::new(&self.name, &self.fields)
    }
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    document: Option<Document>,
}

/// Document store backed by the hosted document database's REST API.
#[derive(Debug, Clone)]
pub struct FirestoreStore {
    http: Client,
    /// `projects/{project}/databases/(default)/documents`
    root: String,
    base_url: String,
    api_key: Option<String>,
    id_token: Option<String>,
}

impl FirestoreStore {
    pub fn new(config: &FirestoreConfig) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent("VoteChain/0.3")
            .build()
            .map_err(|e| StoreError::Http(e.to_string()))?;
        Ok(Self {
            http,
            root: format!(
                "projects/{}/databases/(default)/documents",
                config.project_id
            ),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            id_token: None,
        })
    }

    /// Attach the signed-in user's ID token to every request.
    pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = Some(token.into());
        self
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{collection}/{id}", self.root)
    }

    fn endpoint(&self, suffix: &str, params: &[(&str, &str)]) -> Result<Url, StoreError> {
        let mut url = Url::parse(&format!("{}/v1/{}{suffix}", self.base_url, self.root))
            .map_err(|e| StoreError::Http(format!("invalid store url: {e}")))?;
        if !params.is_empty() || self.api_key.is_some() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
            if let Some(api_key) = &self.api_key {
                pairs.append_pair("key", api_key);
            }
        }
        Ok(url)
    }

    /// Send a request; a 404 response or a failed `currentDocument`
    /// precondition is `Ok(None)`.
    async fn send(&self, request: RequestBuilder) -> Result<Option<Value>, StoreError> {
        let request = match &self.id_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let resp = request
            .send()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status == StatusCode::BAD_REQUEST
                && remote_status(&body).as_deref() == Some("FAILED_PRECONDITION")
            {
                return Ok(None);
            }
            return Err(StoreError::Remote {
                status: status.as_u16(),
                message: remote_message(&body),
            });
        }
        let body = resp
            .json::<Value>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Some(body))
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let url = self.endpoint(&format!("/{collection}/{id}"), &[])?;
        match self.send(self.http.get(url)).await? {
            Some(body) => Ok(Some(parse_document(body)?)),
            None => Ok(None),
        }
    }

    async fn create_document(
        &self,
        collection: &str,
        fields: Value,
    ) -> Result<Document, StoreError> {
        let id = Uuid::new_v4().to_string();
        let url = self.endpoint(&format!("/{collection}"), &[("documentId", id.as_str())])?;
        let body = self
            .send(self.http.post(url).json(&json!({ "fields": fields })))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("collection {collection}")))?;
        parse_document(body)
    }

    /// Partial update of the fields named in `fields`. With `must_exist`
    /// a missing document is `NotFound`; otherwise it is created.
    async fn patch_document(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
        must_exist: bool,
    ) -> Result<Document, StoreError> {
        let mut params: Vec<(&str, &str)> = fields
            .keys()
            .map(|k| ("updateMask.fieldPaths", k.as_str()))
            .collect();
        if must_exist {
            params.push(("currentDocument.exists", "true"));
        }
        let url = self.endpoint(&format!("/{collection}/{id}"), &params)?;
        let body = self
            .send(self.http.patch(url).json(&json!({ "fields": fields })))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{collection} {id}")))?;
        parse_document(body)
    }

    async fn run_query(&self, query: Value) -> Result<Vec<Document>, StoreError> {
        let url = self.endpoint(":runQuery", &[])?;
        let Some(body) = self
            .send(self.http.post(url).json(&json!({ "structuredQuery": query })))
            .await?
        else {
            return Ok(Vec::new());
        };
        let results: Vec<QueryResult> =
            serde_json::from_value(body).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(results.into_iter().filter_map(|r| r.document).collect())
    }

    async fn query_votes(&self, field: &str, value: &str) -> Result<Vec<VoteRecord>, StoreError> {
        let query = structured_query(VOTES, Some((field, fields::string(value))), None, None);
        self.run_query(query)
            .await?
            .iter()
            .map(vote_from_document)
            .collect()
    }
}

fn parse_document(body: Value) -> Result<Document, StoreError> {
    serde_json::from_value(body).map_err(|e| StoreError::Decode(e.to_string()))
}

fn remote_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

fn remote_status(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .pointer("/error/status")?
        .as_str()
        .map(str::to_string)
}

fn structured_query(
    collection: &str,
    equals: Option<(&str, Value)>,
    order_desc: Option<&str>,
    limit: Option<u32>,
) -> Value {
    let mut query = json!({ "from": [{ "collectionId": collection }] });
    if let Some((field, value)) = equals {
        query["where"] = json!({
            "fieldFilter": {
                "field": { "fieldPath": field },
                "op": "EQUAL",
                "value": value,
            }
        });
    }
    if let Some(field) = order_desc {
        query["orderBy"] = json!([{ "field": { "fieldPath": field }, "direction": "DESCENDING" }]);
    }
    if let Some(limit) = limit {
        query["limit"] = json!(limit);
    }
    query
}

fn status_fields(status: PollStatus, now: DateTime<Utc>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("status".into(), fields::string(status.as_str()));
    map.insert("updatedAt".into(), fields::timestamp(now));
    map
}

/// One write of a `commit` batch updating a poll's status.
fn status_write(document_name: &str, status: PollStatus, now: DateTime<Utc>) -> Value {
    json!({
        "update": { "name": document_name, "fields": status_fields(status, now) },
        "updateMask": { "fieldPaths": ["status", "updatedAt"] },
        "currentDocument": { "exists": true },
    })
}

fn poll_fields(poll: &NewPoll, now: DateTime<Utc>) -> Value {
    json!({
        "title": fields::string(&poll.title),
        "description": fields::string(&poll.description),
        "candidates": fields::string_array(&poll.candidates),
        "startDate": fields::timestamp(poll.start_date),
        "endDate": fields::timestamp(poll.end_date),
        "status": fields::string(PollStatus::Draft.as_str()),
        "createdAt": fields::timestamp(now),
        "updatedAt": fields::timestamp(now),
        "createdBy": fields::string(&poll.created_by),
    })
}

fn poll_from_document(doc: &Document) -> Result<Poll, StoreError> {
    let f = doc.fields();
    let status = f
        .string("status")?
        .parse::<PollStatus>()
        .map_err(|e| StoreError::Decode(format!("{}: {e}", doc.name)))?;
    let created_at = f.timestamp("createdAt")?;
    Ok(Poll {
        id: doc.id().to_string(),
        title: f.string("title")?,
        description: f.optional_string("description").unwrap_or_default(),
        candidates: f.string_array("candidates")?,
        start_date: f.timestamp("startDate")?,
        end_date: f.timestamp("endDate")?,
        status,
        created_at,
        updated_at: f.timestamp("updatedAt").unwrap_or(created_at),
        created_by: f.optional_string("createdBy").unwrap_or_default(),
    })
}

fn vote_fields(
    poll_id: &str,
    user_id: &str,
    candidate: CandidateIndex,
    wallet_address: &str,
    now: DateTime<Utc>,
) -> Value {
    json!({
        "pollId": fields::string(poll_id),
        "userId": fields::string(user_id),
        "candidateId": fields::integer(i64::from(candidate.0)),
        "walletAddress": fields::string(wallet_address),
        "timestamp": fields::timestamp(now),
    })
}

fn vote_from_document(doc: &Document) -> Result<VoteRecord, StoreError> {
    let f = doc.fields();
    let raw = f.integer("candidateId")?;
    let index = u32::try_from(raw)
        .map_err(|_| StoreError::Decode(format!("{}: candidate index {raw} out of range", doc.name)))?;
    Ok(VoteRecord {
        id: doc.id().to_string(),
        poll_id: f.string("pollId")?,
        user_id: f.string("userId")?,
        candidate_index: CandidateIndex(index),
        wallet_address: f.optional_string("walletAddress").unwrap_or_default(),
        created_at: f.timestamp("timestamp")?,
    })
}

impl DocumentStore for FirestoreStore {
    async fn create_poll(&self, poll: &NewPoll) -> Result<Poll, StoreError> {
        let doc = self
            .create_document(POLLS, poll_fields(poll, Utc::now()))
            .await?;
        tracing::info!(poll = doc.id(), title = %poll.title, "poll created");
        poll_from_document(&doc)
    }

    async fn get_polls(&self) -> Result<Vec<Poll>, StoreError> {
        self.run_query(structured_query(POLLS, None, Some("createdAt"), None))
            .await?
            .iter()
            .map(poll_from_document)
            .collect()
    }

    async fn get_active_poll(&self) -> Result<Option<Poll>, StoreError> {
        let query = structured_query(
            POLLS,
            Some(("status", fields::string(PollStatus::Active.as_str()))),
            None,
            Some(1),
        );
        match self.run_query(query).await?.first() {
            Some(doc) => Ok(Some(poll_from_document(doc)?)),
            None => Ok(None),
        }
    }

    async fn get_poll(&self, id: &str) -> Result<Option<Poll>, StoreError> {
        match self.get_document(POLLS, id).await? {
            Some(doc) => Ok(Some(poll_from_document(&doc)?)),
            None => Ok(None),
        }
    }

    async fn update_poll_status(
        &self,
        id: &str,
        status: PollStatus,
    ) -> Result<Poll, StoreError> {
        let now = Utc::now();
        if status != PollStatus::Active {
            let doc = self
                .patch_document(POLLS, id, status_fields(status, now), true)
                .await?;
            tracing::info!(poll = id, status = %status, "poll status updated");
            return poll_from_document(&doc);
        }

        // Ending the current active polls and activating the target commit
        // together, so a failed precondition leaves everything untouched.
        let active = structured_query(
            POLLS,
            Some(("status", fields::string(PollStatus::Active.as_str()))),
            None,
            None,
        );
        let target = self.document_name(POLLS, id);
        let mut writes: Vec<Value> = self
            .run_query(active)
            .await?
            .iter()
            .filter(|doc| doc.name != target)
            .map(|doc| status_write(&doc.name, PollStatus::Ended, now))
            .collect();
        let ended = writes.len();
        writes.push(status_write(&target, PollStatus::Active, now));

        let url = self.endpoint(":commit", &[])?;
        self.send(self.http.post(url).json(&json!({ "writes": writes })))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("poll {id}")))?;
        if ended > 0 {
            tracing::info!(poll = id, ended, "ended previously active polls");
        }
        tracing::info!(poll = id, status = %status, "poll status updated");

        self.get_poll(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("poll {id}")))
    }

    async fn record_vote(
        &self,
        poll_id: &str,
        user_id: &str,
        candidate: CandidateIndex,
        wallet_address: &str,
    ) -> Result<VoteRecord, StoreError> {
        let fields = vote_fields(poll_id, user_id, candidate, wallet_address, Utc::now());
        let doc = self.create_document(VOTES, fields).await?;
        vote_from_document(&doc)
    }

    async fn get_user_votes(&self, user_id: &str) -> Result<Vec<VoteRecord>, StoreError> {
        self.query_votes("userId", user_id).await
    }

    async fn get_poll_votes(&self, poll_id: &str) -> Result<Vec<VoteRecord>, StoreError> {
        self.query_votes("pollId", poll_id).await
    }

    async fn set_user_role(&self, user_id: &str, role: Role) -> Result<(), StoreError> {
        let mut map = Map::new();
        map.insert("role".into(), fields::string(role.as_str()));
        map.insert("updatedAt".into(), fields::timestamp(Utc::now()));
        self.patch_document(USERS, user_id, map, false).await?;
        tracing::info!(user = user_id, role = %role, "user role stored");
        Ok(())
    }

    async fn get_user_role(&self, user_id: &str) -> Result<Role, StoreError> {
        let Some(doc) = self.get_document(USERS, user_id).await? else {
            return Ok(Role::User);
        };
        match doc.fields().optional_string("role") {
            Some(role) => role
                .parse::<Role>()
                .map_err(|e| StoreError::Decode(format!("{}: {e}", doc.name))),
            None => Ok(Role::User),
        }
    }
}
