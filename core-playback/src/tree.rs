//! # Widget Tree
//!
//! Documents are expanded into an arena of [`TreeNode`]s rather than nested
//! owned widgets. Construction runs in two passes:
//!
//! 1. **Expand** (breadth-first, iterative): validate each node's `type`,
//!    evaluate `cond`, resolve `opts`/`style` against the node's own binding
//!    scope and queue its children. List items and nested templates get a
//!    fresh child scope. Depth never touches the call stack.
//! 2. **Instantiate** (reverse breadth-first order): children always have a
//!    higher index than their parent, so walking backwards builds every child
//!    before the container that owns it.
//!
//! Any construction error aborts the whole build before playback starts.

use crate::context::{evaluate_condition, resolve_option, TemplateContext};
use crate::error::{PlaybackError, Result};
use crate::factory::WidgetType;
use crate::traits::Playable;
use crate::widgets::WidgetDeps;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// One expanded document node.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub kind: WidgetType,
    pub name: String,
    /// JSON-path-like location used in error messages.
    pub path: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Options after binding resolution.
    pub opts: Value,
    pub style: Map<String, Value>,
    pub animations: Vec<Value>,
    pub context: TemplateContext,
}

struct Pending<'a> {
    raw: &'a Value,
    ctx: TemplateContext,
    parent: Option<usize>,
    path: String,
}

/// Arena of expanded nodes and their playables, indexed in BFS order.
pub struct WidgetTree {
    nodes: Vec<TreeNode>,
    playables: Vec<Arc<dyn Playable>>,
}

impl WidgetTree {
    pub fn build(doc: &Value, ctx: &TemplateContext, deps: &WidgetDeps) -> Result<Self> {
        Self::build_at(doc, ctx, deps, "$")
    }

    /// Build with `path` as the location prefix reported in errors.
    pub fn build_at(
        doc: &Value,
        ctx: &TemplateContext,
        deps: &WidgetDeps,
        path: &str,
    ) -> Result<Self> {
        let nodes = expand(doc, ctx, deps.config.max_tree_nodes, path)?;
        let playables = instantiate(&nodes, deps)?;
        debug!(nodes = nodes.len(), path, "Widget tree built");
        Ok(Self { nodes, playables })
    }

    pub fn root(&self) -> Arc<dyn Playable> {
        Arc::clone(&self.playables[0])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn children_of(&self, index: usize) -> &[usize] {
        self.nodes
            .get(index)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn playable(&self, index: usize) -> Option<&Arc<dyn Playable>> {
        self.playables.get(index)
    }
}

impl std::fmt::Debug for WidgetTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetTree")
            .field("nodes", &self.nodes)
            .finish_non_exhaustive()
    }
}

fn expand(doc: &Value, ctx: &TemplateContext, limit: usize, root_path: &str) -> Result<Vec<TreeNode>> {
    let mut nodes: Vec<TreeNode> = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back(Pending {
        raw: doc,
        ctx: ctx.clone(),
        parent: None,
        path: root_path.to_string(),
    });

    while let Some(pending) = queue.pop_front() {
        let obj = pending.raw.as_object().ok_or_else(|| {
            PlaybackError::MalformedDocument(format!("{} is not an object", pending.path))
        })?;
        let tag = obj.get("type").and_then(Value::as_str).ok_or_else(|| {
            PlaybackError::MalformedDocument(format!("{} has no type", pending.path))
        })?;
        let kind = WidgetType::parse(tag, &pending.path)?;

        let included = obj
            .get("cond")
            .map(|cond| evaluate_condition(cond, &pending.ctx))
            .unwrap_or(true);
        if !included && pending.parent.is_some() {
            continue;
        }

        if nodes.len() >= limit {
            return Err(PlaybackError::TreeTooLarge { limit });
        }
        let index = nodes.len();

        // Nested template documents are resolved later in their own scope.
        let mut raw_opts = obj.get("opts").cloned().unwrap_or(Value::Null);
        if let Value::Object(map) = &mut raw_opts {
            map.remove("template");
        }
        let opts = resolve_option(&raw_opts, &pending.ctx);
        let style = match obj.get("style").map(|s| resolve_option(s, &pending.ctx)) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let animations = match obj.get("animations").map(|a| resolve_option(a, &pending.ctx)) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{kind}-{index}"));

        if let Some(parent) = pending.parent {
            nodes[parent].children.push(index);
        }

        // A root excluded by `cond` becomes an empty group.
        if !included {
            nodes.push(TreeNode {
                kind: WidgetType::Group,
                name,
                path: pending.path,
                parent: None,
                children: Vec::new(),
                opts: Value::Null,
                style,
                animations,
                context: pending.ctx,
            });
            continue;
        }

        let raw_children = obj.get("children").and_then(Value::as_array);
        match kind {
            WidgetType::Group | WidgetType::Layout => {
                for (i, child) in raw_children.into_iter().flatten().enumerate() {
                    queue.push_back(Pending {
                        raw: child,
                        ctx: pending.ctx.clone(),
                        parent: Some(index),
                        path: format!("{}.children[{i}]", pending.path),
                    });
                }
            }
            WidgetType::List => {
                let items = match opts.get("items") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items.clone(),
                    Some(other) => {
                        return Err(PlaybackError::InvalidOptions {
                            widget: kind.to_string(),
                            path: pending.path,
                            message: format!("items must be an array, got {other}"),
                        })
                    }
                };
                let template = match raw_children.and_then(|c| c.first()) {
                    Some(child) => Some((child, format!("{}.children[0]", pending.path))),
                    None => obj
                        .get("opts")
                        .and_then(|o| o.get("template"))
                        .map(|t| (t, format!("{}.opts.template", pending.path))),
                };
                if let Some((template, template_path)) = template {
                    if items.is_empty() {
                        check_types(template, template_path)?;
                    }
                    let item_name = opts.get("as").and_then(Value::as_str).unwrap_or("item");
                    let index_name = opts.get("index").and_then(Value::as_str).unwrap_or("index");
                    for (j, item) in items.into_iter().enumerate() {
                        queue.push_back(Pending {
                            raw: template,
                            ctx: pending.ctx.with(item_name, item).with(index_name, Value::from(j)),
                            parent: Some(index),
                            path: format!("{}.items[{j}]", pending.path),
                        });
                    }
                } else if !items.is_empty() {
                    return Err(PlaybackError::InvalidOptions {
                        widget: kind.to_string(),
                        path: pending.path,
                        message: "list has items but no item template".to_string(),
                    });
                }
            }
            WidgetType::Template => {
                let overrides = match opts.get("context") {
                    Some(Value::Object(map)) => map.clone(),
                    _ => Map::new(),
                };
                let doc = obj
                    .get("template")
                    .or_else(|| obj.get("opts").and_then(|o| o.get("template")));
                if let Some(doc) = doc {
                    queue.push_back(Pending {
                        raw: doc,
                        ctx: pending.ctx.merged(&overrides),
                        parent: Some(index),
                        path: format!("{}.template", pending.path),
                    });
                }
            }
            _ => {}
        }

        nodes.push(TreeNode {
            kind,
            name,
            path: pending.path,
            parent: pending.parent,
            children: Vec::new(),
            opts,
            style,
            animations,
            context: pending.ctx,
        });
    }

    Ok(nodes)
}

/// Validate every `type` tag in an unbound document.
///
/// An item template is only expanded once per item, so an empty list would
/// otherwise accept a template naming an unknown widget.
fn check_types(doc: &Value, path: String) -> Result<()> {
    let mut queue = VecDeque::from([(doc, path)]);
    while let Some((raw, path)) = queue.pop_front() {
        let obj = raw
            .as_object()
            .ok_or_else(|| PlaybackError::MalformedDocument(format!("{path} is not an object")))?;
        let tag = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| PlaybackError::MalformedDocument(format!("{path} has no type")))?;
        let kind = WidgetType::parse(tag, &path)?;
        if !kind.is_container() {
            continue;
        }
        let children = obj.get("children").and_then(Value::as_array);
        for (i, child) in children.into_iter().flatten().enumerate() {
            queue.push_back((child, format!("{path}.children[{i}]")));
        }
        if let Some(nested) = obj.get("template") {
            queue.push_back((nested, format!("{path}.template")));
        }
        if let Some(nested) = obj.get("opts").and_then(|o| o.get("template")) {
            queue.push_back((nested, format!("{path}.opts.template")));
        }
    }
    Ok(())
}

fn instantiate(nodes: &[TreeNode], deps: &WidgetDeps) -> Result<Vec<Arc<dyn Playable>>> {
    let mut built: Vec<Option<Arc<dyn Playable>>> = vec![None; nodes.len()];
    for (index, node) in nodes.iter().enumerate().rev() {
        let children = node
            .children
            .iter()
            .map(|&child| {
                built[child].clone().ok_or_else(|| {
                    PlaybackError::Internal(format!("child {child} of {} not built", node.path))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        built[index] = Some(node.kind.construct(node, children, deps)?);
    }
    built
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| PlaybackError::Internal("widget tree is empty".to_string()))
}
