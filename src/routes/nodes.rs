//! Container and learning node routes
//!
//! All paths require a bearer token; every query is scoped to the
//! authenticated user. Deleting a container cascades over an id-indexed
//! arena of the user's containers, collected in post order, so arbitrarily
//! deep trees delete without recursion over live store handles.

use bson::{doc, oid::ObjectId, Bson};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::db::schemas::{ContainerNodeDoc, LearningNodeDoc};
use crate::routes::helpers::{
    error_response, json_response, parse_json_body, parse_object_id, parse_query_params,
};
use crate::server::AppState;
use crate::types::UltimaError;

// ============================================================================
// Views
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerView {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub order_index: i32,
    #[serde(rename = "type")]
    pub node_type: &'static str,
}

impl ContainerView {
    fn from_doc(doc: &ContainerNodeDoc) -> Self {
        Self {
            id: doc._id.map(|id| id.to_hex()).unwrap_or_default(),
            title: doc.title.clone(),
            description: doc.description.clone(),
            category: doc.category.clone(),
            parent_id: doc.parent_id.map(|id| id.to_hex()),
            order_index: doc.order_index,
            node_type: "container",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningView {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_container_id: Option<String>,
    pub total_xp: u64,
    pub level: u32,
    pub xp_in_level: u32,
    pub milestone_tier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_rubric: Option<Bson>,
    #[serde(rename = "type")]
    pub node_type: &'static str,
}

impl LearningView {
    fn from_doc(doc: &LearningNodeDoc) -> Self {
        Self {
            id: doc._id.map(|id| id.to_hex()).unwrap_or_default(),
            title: doc.title.clone(),
            description: doc.description.clone(),
            parent_container_id: doc.parent_container_id.map(|id| id.to_hex()),
            total_xp: doc.total_xp,
            level: doc.level,
            xp_in_level: doc.xp_in_level,
            milestone_tier: doc.milestone_tier.to_string(),
            review_rubric: doc.review_rubric.clone(),
            node_type: "learning",
        }
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateContainerRequest {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    order_index: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateContainerRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReorderRequest {
    #[serde(default)]
    order_index: Option<i32>,
    /// New parent; Some(None) moves the container to the root
    #[serde(default, with = "double_option")]
    new_parent_id: Option<Option<String>>,
}

/// Distinguishes an absent field from an explicit null
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(de).map(Some)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLearningRequest {
    title: String,
    #[serde(default)]
    description: String,
    parent_container_id: String,
    #[serde(default)]
    review_rubric: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateLearningRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    review_rubric: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AddXpRequest {
    amount: i64,
}

#[derive(Debug, Serialize)]
struct DeletedResponse {
    deleted: bool,
    containers_removed: u64,
    learning_nodes_removed: u64,
}

// ============================================================================
// Router
// ============================================================================

/// Handle /api/nodes/* requests for an authenticated user
pub async fn handle_nodes_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: ObjectId,
) -> Response<Full<Bytes>> {
    route(req, state, user_id)
        .await
        .unwrap_or_else(|e| error_response(&e))
}

async fn route(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: ObjectId,
) -> HandlerResult {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();

    match (method, path.as_str()) {
        (Method::GET, "/api/nodes") => list_all_nodes(state, user_id).await,

        (Method::POST, "/api/nodes/container") => create_container(req, state, user_id).await,
        (Method::GET, "/api/nodes/container") => {
            list_containers(state, user_id, &parse_query_params(&query)).await
        }
        (Method::GET, p) if p.starts_with("/api/nodes/container/") => {
            let id = parse_object_id(p.trim_start_matches("/api/nodes/container/"))?;
            get_container(state, user_id, id).await
        }
        (Method::PUT, p)
            if p.starts_with("/api/nodes/container/") && p.ends_with("/reorder") =>
        {
            let segment = p
                .trim_start_matches("/api/nodes/container/")
                .trim_end_matches("/reorder")
                .trim_end_matches('/');
            let id = parse_object_id(segment)?;
            reorder_container(req, state, user_id, id).await
        }
        (Method::PUT, p) if p.starts_with("/api/nodes/container/") => {
            let id = parse_object_id(p.trim_start_matches("/api/nodes/container/"))?;
            update_container(req, state, user_id, id).await
        }
        (Method::DELETE, p) if p.starts_with("/api/nodes/container/") => {
            let id = parse_object_id(p.trim_start_matches("/api/nodes/container/"))?;
            delete_container(state, user_id, id).await
        }

        (Method::POST, "/api/nodes/learning") => create_learning(req, state, user_id).await,
        (Method::GET, "/api/nodes/learning") => {
            list_learning(state, user_id, &parse_query_params(&query)).await
        }
        (Method::POST, p)
            if p.starts_with("/api/nodes/learning/") && p.ends_with("/xp") =>
        {
            let segment = p
                .trim_start_matches("/api/nodes/learning/")
                .trim_end_matches("/xp")
                .trim_end_matches('/');
            let id = parse_object_id(segment)?;
            add_xp(req, state, user_id, id).await
        }
        (Method::GET, p) if p.starts_with("/api/nodes/learning/") => {
            let id = parse_object_id(p.trim_start_matches("/api/nodes/learning/"))?;
            get_learning(state, user_id, id).await
        }
        (Method::PUT, p) if p.starts_with("/api/nodes/learning/") => {
            let id = parse_object_id(p.trim_start_matches("/api/nodes/learning/"))?;
            update_learning(req, state, user_id, id).await
        }
        (Method::DELETE, p) if p.starts_with("/api/nodes/learning/") => {
            let id = parse_object_id(p.trim_start_matches("/api/nodes/learning/"))?;
            delete_learning(state, user_id, id).await
        }

        _ => Err(UltimaError::NotFound(format!("No route for {}", path))),
    }
}

type HandlerResult = Result<Response<Full<Bytes>>, UltimaError>;

// ============================================================================
// Container handlers
// ============================================================================

async fn create_container(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: ObjectId,
) -> HandlerResult {
    let body: CreateContainerRequest = parse_json_body(req).await?;

    if body.title.trim().is_empty() {
        return Err(UltimaError::BadRequest("Title is required".into()));
    }

    let parent_id = match body.parent_id {
        Some(raw) => {
            let parent_id = parse_object_id(&raw)?;
            state
                .containers
                .find_one(doc! { "_id": parent_id, "created_by": user_id })
                .await?
                .ok_or_else(|| UltimaError::BadRequest("Invalid parent container".into()))?;
            Some(parent_id)
        }
        None => None,
    };

    let node = ContainerNodeDoc::new(
        body.title,
        body.description,
        body.category,
        parent_id,
        body.order_index,
        user_id,
    );
    let id = state.containers.insert_one(node.clone()).await?;

    let mut created = node;
    created._id = Some(id);
    Ok(json_response(
        StatusCode::CREATED,
        &ContainerView::from_doc(&created),
    ))
}

async fn list_containers(
    state: Arc<AppState>,
    user_id: ObjectId,
    params: &HashMap<String, String>,
) -> HandlerResult {
    let mut filter = doc! { "created_by": user_id };
    match params.get("parentId") {
        Some(raw) => {
            filter.insert("parent_id", parse_object_id(raw)?);
        }
        // Roots only when no parent is given
        None => {
            filter.insert("parent_id", Bson::Null);
        }
    }

    let nodes = state
        .containers
        .find_many_sorted(filter, Some(doc! { "order_index": 1 }), None, None)
        .await?;

    let views: Vec<ContainerView> = nodes.iter().map(ContainerView::from_doc).collect();
    Ok(json_response(StatusCode::OK, &views))
}

async fn get_container(state: Arc<AppState>, user_id: ObjectId, id: ObjectId) -> HandlerResult {
    let node = state
        .containers
        .find_one(doc! { "_id": id, "created_by": user_id })
        .await?
        .ok_or_else(|| UltimaError::NotFound("Container not found".into()))?;

    // Aggregate progress over the contained learning nodes
    let children = state
        .learning
        .find_many(doc! { "parent_container_id": id, "created_by": user_id })
        .await?;

    let total_xp: u64 = children.iter().map(|n| n.total_xp).sum();
    let average_level = if children.is_empty() {
        0
    } else {
        children.iter().map(|n| n.level as u64).sum::<u64>() / children.len() as u64
    };

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct ContainerDetail {
        #[serde(flatten)]
        container: ContainerView,
        children: Vec<LearningView>,
        total_xp: u64,
        average_level: u64,
    }

    Ok(json_response(
        StatusCode::OK,
        &ContainerDetail {
            container: ContainerView::from_doc(&node),
            children: children.iter().map(LearningView::from_doc).collect(),
            total_xp,
            average_level,
        },
    ))
}

async fn update_container(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: ObjectId,
    id: ObjectId,
) -> HandlerResult {
    let body: UpdateContainerRequest = parse_json_body(req).await?;

    let mut node = state
        .containers
        .find_one(doc! { "_id": id, "created_by": user_id })
        .await?
        .ok_or_else(|| UltimaError::NotFound("Container not found".into()))?;

    if let Some(title) = body.title {
        if title.trim().is_empty() {
            return Err(UltimaError::BadRequest("Title cannot be empty".into()));
        }
        node.title = title;
    }
    if let Some(description) = body.description {
        node.description = description;
    }
    if let Some(category) = body.category {
        node.category = Some(category);
    }

    state.containers.replace_by_id(id, node.clone()).await?;
    Ok(json_response(StatusCode::OK, &ContainerView::from_doc(&node)))
}

async fn reorder_container(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: ObjectId,
    id: ObjectId,
) -> HandlerResult {
    let body: ReorderRequest = parse_json_body(req).await?;

    let mut node = state
        .containers
        .find_one(doc! { "_id": id, "created_by": user_id })
        .await?
        .ok_or_else(|| UltimaError::NotFound("Container not found".into()))?;

    if let Some(new_parent) = body.new_parent_id {
        node.parent_id = match new_parent {
            Some(raw) => {
                let parent_id = parse_object_id(&raw)?;
                if parent_id == id {
                    return Err(UltimaError::BadRequest(
                        "A container cannot be its own parent".into(),
                    ));
                }
                state
                    .containers
                    .find_one(doc! { "_id": parent_id, "created_by": user_id })
                    .await?
                    .ok_or_else(|| UltimaError::BadRequest("Invalid parent container".into()))?;
                Some(parent_id)
            }
            None => None,
        };
    }

    if let Some(order_index) = body.order_index {
        node.order_index = order_index;
    }

    state.containers.replace_by_id(id, node.clone()).await?;
    Ok(json_response(StatusCode::OK, &ContainerView::from_doc(&node)))
}

/// Collect the target container and all its descendants in post order.
///
/// Works over a pre-fetched arena of (id, parent_id) pairs, so cycles or
/// arbitrarily deep trees cannot blow the stack.
pub fn collect_subtree_post_order(
    arena: &[(ObjectId, Option<ObjectId>)],
    root: ObjectId,
) -> Vec<ObjectId> {
    let mut children: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
    for (id, parent) in arena {
        if let Some(parent) = parent {
            children.entry(*parent).or_default().push(*id);
        }
    }

    let mut ordered = Vec::new();
    let mut visited: std::collections::HashSet<ObjectId> = std::collections::HashSet::new();
    let mut stack = vec![(root, false)];
    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            ordered.push(id);
            continue;
        }
        // Guard against cycles in corrupted data
        if !visited.insert(id) {
            continue;
        }
        stack.push((id, true));
        if let Some(kids) = children.get(&id) {
            for kid in kids {
                stack.push((*kid, false));
            }
        }
    }

    ordered
}

async fn delete_container(state: Arc<AppState>, user_id: ObjectId, id: ObjectId) -> HandlerResult {
    state
        .containers
        .find_one(doc! { "_id": id, "created_by": user_id })
        .await?
        .ok_or_else(|| UltimaError::NotFound("Container not found".into()))?;

    // One query builds the arena; the traversal itself touches no handles
    let all = state
        .containers
        .find_many(doc! { "created_by": user_id })
        .await?;
    let arena: Vec<(ObjectId, Option<ObjectId>)> = all
        .iter()
        .filter_map(|c| c._id.map(|cid| (cid, c.parent_id)))
        .collect();

    let subtree = collect_subtree_post_order(&arena, id);

    let learning_removed = state
        .learning
        .delete_many(doc! {
            "parent_container_id": { "$in": subtree.clone() },
            "created_by": user_id,
        })
        .await?;
    let containers_removed = state
        .containers
        .delete_many(doc! { "_id": { "$in": subtree }, "created_by": user_id })
        .await?;

    info!(
        container = %id,
        containers_removed,
        learning_removed,
        "container subtree deleted"
    );

    Ok(json_response(
        StatusCode::OK,
        &DeletedResponse {
            deleted: true,
            containers_removed,
            learning_nodes_removed: learning_removed,
        },
    ))
}

// ============================================================================
// Learning node handlers
// ============================================================================

async fn create_learning(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: ObjectId,
) -> HandlerResult {
    let body: CreateLearningRequest = parse_json_body(req).await?;

    if body.title.trim().is_empty() {
        return Err(UltimaError::BadRequest("Title is required".into()));
    }

    let parent_id = parse_object_id(&body.parent_container_id)?;
    state
        .containers
        .find_one(doc! { "_id": parent_id, "created_by": user_id })
        .await?
        .ok_or_else(|| UltimaError::BadRequest("Invalid parent container".into()))?;

    let mut node = LearningNodeDoc::new(body.title, body.description, Some(parent_id), user_id);
    if let Some(rubric) = body.review_rubric {
        node.review_rubric = Some(
            bson::to_bson(&rubric)
                .map_err(|e| UltimaError::BadRequest(format!("Invalid rubric: {}", e)))?,
        );
    }

    let id = state.learning.insert_one(node.clone()).await?;
    node._id = Some(id);

    Ok(json_response(StatusCode::CREATED, &LearningView::from_doc(&node)))
}

async fn list_learning(
    state: Arc<AppState>,
    user_id: ObjectId,
    params: &HashMap<String, String>,
) -> HandlerResult {
    let mut filter = doc! { "created_by": user_id };
    if let Some(raw) = params.get("parentContainerId") {
        filter.insert("parent_container_id", parse_object_id(raw)?);
    }

    let nodes = state.learning.find_many(filter).await?;
    let views: Vec<LearningView> = nodes.iter().map(LearningView::from_doc).collect();
    Ok(json_response(StatusCode::OK, &views))
}

async fn get_learning(state: Arc<AppState>, user_id: ObjectId, id: ObjectId) -> HandlerResult {
    let node = state
        .learning
        .find_one(doc! { "_id": id, "created_by": user_id })
        .await?
        .ok_or_else(|| UltimaError::NotFound("Learning node not found".into()))?;

    Ok(json_response(StatusCode::OK, &LearningView::from_doc(&node)))
}

async fn update_learning(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: ObjectId,
    id: ObjectId,
) -> HandlerResult {
    let body: UpdateLearningRequest = parse_json_body(req).await?;

    let mut node = state
        .learning
        .find_one(doc! { "_id": id, "created_by": user_id })
        .await?
        .ok_or_else(|| UltimaError::NotFound("Learning node not found".into()))?;

    if let Some(title) = body.title {
        if title.trim().is_empty() {
            return Err(UltimaError::BadRequest("Title cannot be empty".into()));
        }
        node.title = title;
    }
    if let Some(description) = body.description {
        node.description = description;
    }
    if let Some(rubric) = body.review_rubric {
        node.review_rubric = Some(
            bson::to_bson(&rubric)
                .map_err(|e| UltimaError::BadRequest(format!("Invalid rubric: {}", e)))?,
        );
    }

    state.learning.replace_by_id(id, node.clone()).await?;
    Ok(json_response(StatusCode::OK, &LearningView::from_doc(&node)))
}

async fn delete_learning(state: Arc<AppState>, user_id: ObjectId, id: ObjectId) -> HandlerResult {
    let deleted = state
        .learning
        .delete_one(doc! { "_id": id, "created_by": user_id })
        .await?;
    if deleted == 0 {
        return Err(UltimaError::NotFound("Learning node not found".into()));
    }

    Ok(json_response(
        StatusCode::OK,
        &DeletedResponse {
            deleted: true,
            containers_removed: 0,
            learning_nodes_removed: 1,
        },
    ))
}

/// Manual XP award; the amount must be positive
async fn add_xp(
    req: Request<Incoming>,
    state: Arc<AppState>,
    user_id: ObjectId,
    id: ObjectId,
) -> HandlerResult {
    let body: AddXpRequest = parse_json_body(req).await?;

    if body.amount <= 0 {
        return Err(UltimaError::BadRequest("Amount must be positive".into()));
    }

    let mut node = state
        .learning
        .find_one(doc! { "_id": id, "created_by": user_id })
        .await?
        .ok_or_else(|| UltimaError::NotFound("Learning node not found".into()))?;

    let mut progress = node.progress();
    progress.add_experience(body.amount as u64);
    node.apply_progress(progress);

    state.learning.replace_by_id(id, node.clone()).await?;
    Ok(json_response(StatusCode::OK, &LearningView::from_doc(&node)))
}

// ============================================================================
// Combined listing
// ============================================================================

async fn list_all_nodes(state: Arc<AppState>, user_id: ObjectId) -> HandlerResult {
    let containers = state
        .containers
        .find_many(doc! { "created_by": user_id })
        .await?;
    let learning = state
        .learning
        .find_many(doc! { "created_by": user_id })
        .await?;

    #[derive(Serialize)]
    #[serde(untagged)]
    enum NodeView {
        Container(ContainerView),
        Learning(LearningView),
    }

    let mut nodes: Vec<(String, NodeView)> = containers
        .iter()
        .map(|c| (c.title.clone(), NodeView::Container(ContainerView::from_doc(c))))
        .chain(
            learning
                .iter()
                .map(|n| (n.title.clone(), NodeView::Learning(LearningView::from_doc(n)))),
        )
        .collect();
    nodes.sort_by(|(a, _), (b, _)| a.cmp(b));

    #[derive(Serialize)]
    struct AllNodesResponse {
        nodes: Vec<NodeView>,
    }

    Ok(json_response(
        StatusCode::OK,
        &AllNodesResponse {
            nodes: nodes.into_iter().map(|(_, v)| v).collect(),
        },
    ))
}
