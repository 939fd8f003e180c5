//! The standard insights procedures, evaluated against in-memory tables.
//!
//! Argument names and result shapes match the hosted database functions.

use super::{MemoryTables, Procedure};
use crate::{Filter, GatewayError, GatewayResult, Query};
use insights_model::{tables, ANONYMOUS_AUTHOR};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub(super) fn standard() -> Vec<(&'static str, Procedure)> {
    vec![
        ("get_like_count", Arc::new(get_like_count) as Procedure),
        ("has_user_liked", Arc::new(has_user_liked) as Procedure),
        ("toggle_like", Arc::new(toggle_like) as Procedure),
        ("get_blog_comments", Arc::new(get_blog_comments) as Procedure),
        ("add_blog_comment", Arc::new(add_blog_comment) as Procedure),
        ("delete_blog_comment", Arc::new(delete_blog_comment) as Procedure),
    ]
}

fn get_like_count(t: &mut MemoryTables, _caller: Option<&str>, args: &Value) -> GatewayResult<Value> {
    let blog_id = arg(args, "p_blog_id")?;
    Ok(json!(t.count(tables::LIKES, &Filter::all().eq("blog_id", blog_id))?))
}

fn has_user_liked(t: &mut MemoryTables, _caller: Option<&str>, args: &Value) -> GatewayResult<Value> {
    let filter = Filter::all()
        .eq("blog_id", arg(args, "p_blog_id")?)
        .eq("user_id", arg(args, "p_user_id")?);
    Ok(json!(t.count(tables::LIKES, &filter)? > 0))
}

fn toggle_like(t: &mut MemoryTables, caller: Option<&str>, args: &Value) -> GatewayResult<Value> {
    let user_id = caller.ok_or_else(unauthenticated)?;
    let blog_id = arg(args, "p_blog_id")?;
    let mine = Filter::all().eq("blog_id", blog_id).eq("user_id", user_id);

    let liked = if t.count(tables::LIKES, &mine)? > 0 {
        t.delete(tables::LIKES, &mine)?;
        false
    } else {
        t.insert(tables::LIKES, json!({"blog_id": blog_id, "user_id": user_id}))?;
        true
    };
    let count = t.count(tables::LIKES, &Filter::all().eq("blog_id", blog_id))?;
    Ok(json!({"liked": liked, "count": count}))
}

fn get_blog_comments(t: &mut MemoryTables, _caller: Option<&str>, args: &Value) -> GatewayResult<Value> {
    let blog_id = arg(args, "p_blog_id")?;
    let comments = t.select(
        tables::COMMENTS,
        &Query::all().eq("blog_id", blog_id).order_asc("created_at"),
    )?;
    let authors = profiles_for(t, &comments)?;
    let enriched: Vec<Value> = comments
        .into_iter()
        .map(|comment| with_author(comment, &authors))
        .collect();
    Ok(Value::Array(enriched))
}

fn add_blog_comment(t: &mut MemoryTables, caller: Option<&str>, args: &Value) -> GatewayResult<Value> {
    let Some(user_id) = caller else {
        return Ok(json!({"error": "Not authenticated"}));
    };
    let content = arg(args, "p_content")?.trim();
    if content.is_empty() {
        return Ok(json!({"error": "Comment cannot be empty"}));
    }
    let row = t.insert(
        tables::COMMENTS,
        json!({
            "blog_id": arg(args, "p_blog_id")?,
            "user_id": user_id,
            "content": content,
            "parent_id": args.get("p_parent_id").cloned().unwrap_or(Value::Null),
        }),
    )?;
    let authors = profiles_for(t, std::slice::from_ref(&row))?;
    Ok(with_author(row, &authors))
}

fn delete_blog_comment(t: &mut MemoryTables, caller: Option<&str>, args: &Value) -> GatewayResult<Value> {
    let Some(user_id) = caller else {
        return Ok(json!({"error": "Not authenticated"}));
    };
    let filter = Filter::all()
        .eq("id", arg(args, "p_comment_id")?)
        .eq("user_id", user_id);
    if t.delete(tables::COMMENTS, &filter)?.is_empty() {
        return Ok(json!({"error": "Comment not found or not owned by user"}));
    }
    Ok(json!({"success": true}))
}

fn arg<'a>(args: &'a Value, name: &str) -> GatewayResult<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::Validation(format!("missing argument {name}")))
}

fn unauthenticated() -> GatewayError {
    GatewayError::Api {
        status: 401,
        code: Some("42501".to_string()),
        message: "not authenticated".to_string(),
    }
}

fn profiles_for(t: &MemoryTables, comments: &[Value]) -> GatewayResult<HashMap<String, Value>> {
    let mut ids: Vec<&str> = comments
        .iter()
        .filter_map(|c| c.get("user_id").and_then(Value::as_str))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() || !t.is_provisioned(tables::USER_PROFILES) {
        return Ok(HashMap::new());
    }
    let profiles = t.select(tables::USER_PROFILES, &Query::all().is_in("id", ids))?;
    Ok(profiles
        .into_iter()
        .filter_map(|p| {
            let id = p.get("id")?.as_str()?.to_string();
            Some((
                id,
                json!({"full_name": p.get("full_name"), "avatar_url": p.get("avatar_url")}),
            ))
        })
        .collect())
}

fn with_author(mut comment: Value, authors: &HashMap<String, Value>) -> Value {
    let author = comment
        .get("user_id")
        .and_then(Value::as_str)
        .and_then(|id| authors.get(id))
        .cloned()
        .unwrap_or_else(|| json!({"full_name": ANONYMOUS_AUTHOR, "avatar_url": null}));
    if let Value::Object(fields) = &mut comment {
        fields.insert("user_profiles".to_string(), author);
    }
    comment
}
