//! In-memory todo list exposed as the `todos` resource.
//!
//! `read` lists every todo, or returns one when `id` is given. `update`
//! applies only the fields present in the body. Unknown ids answer 404,
//! malformed ids and bodies 400.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::resource::{HandlerError, HandlerResult, Resource, ResourceOutput, ResourceRequest};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Todo {
    pub id: Uuid,
    pub title: String,
    pub completed: bool,
}

#[derive(Deserialize)]
pub struct CreateTodo {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Deserialize)]
pub struct UpdateTodo {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

pub type Db = Arc<RwLock<HashMap<Uuid, Todo>>>;

#[derive(Clone, Default)]
pub struct TodoResource {
    db: Db,
}

impl TodoResource {
    pub fn new() -> Self {
        Self::default()
    }
}

fn todo_id(request: &ResourceRequest) -> Result<Uuid, HandlerError> {
    let raw = request
        .param_str("id")
        .ok_or_else(|| HandlerError::bad_request("missing param \"id\""))?;
    Uuid::parse_str(raw).map_err(|_| HandlerError::bad_request(format!("invalid todo id: {raw}")))
}

fn parse_body<T: serde::de::DeserializeOwned>(request: &ResourceRequest) -> Result<T, HandlerError> {
    let body = request.body.clone().unwrap_or(Value::Null);
    serde_json::from_value(body).map_err(|error| HandlerError::bad_request(format!("invalid todo body: {error}")))
}

fn not_found(id: Uuid) -> HandlerError {
    HandlerError::not_found(format!("todo {id} not found")).with_output(json!({"message": "Not found"}))
}

fn to_data(value: &impl Serialize) -> Result<Value, HandlerError> {
    serde_json::to_value(value).map_err(|error| HandlerError::internal(error.to_string()))
}

#[async_trait]
impl Resource for TodoResource {
    async fn create(&self, request: ResourceRequest) -> HandlerResult {
        let input: CreateTodo = parse_body(&request)?;
        let todo = Todo {
            id: Uuid::new_v4(),
            title: input.title,
            completed: input.completed,
        };
        self.db.write().await.insert(todo.id, todo.clone());
        Ok(ResourceOutput::new(to_data(&todo)?).with_meta(json!({"statusCode": 201})))
    }

    async fn read(&self, request: ResourceRequest) -> HandlerResult {
        let todos = self.db.read().await;
        if request.params.contains_key("id") {
            let id = todo_id(&request)?;
            let todo = todos.get(&id).ok_or_else(|| not_found(id))?;
            return Ok(ResourceOutput::new(to_data(todo)?));
        }
        let mut all: Vec<&Todo> = todos.values().collect();
        all.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(ResourceOutput::new(to_data(&all)?))
    }

    async fn update(&self, request: ResourceRequest) -> HandlerResult {
        let id = todo_id(&request)?;
        let input: UpdateTodo = parse_body(&request)?;
        let mut todos = self.db.write().await;
        let todo = todos.get_mut(&id).ok_or_else(|| not_found(id))?;
        if let Some(title) = input.title {
            todo.title = title;
        }
        if let Some(completed) = input.completed {
            todo.completed = completed;
        }
        Ok(ResourceOutput::new(to_data(todo)?))
    }

    async fn delete(&self, request: ResourceRequest) -> HandlerResult {
        let id = todo_id(&request)?;
        self.db
            .write()
            .await
            .remove(&id)
            .map(|_| ResourceOutput::new(Value::Null))
            .ok_or_else(|| not_found(id))
    }
}
