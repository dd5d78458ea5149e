use std::collections::HashMap;
use std::fmt::Write as _;

use arbor_sdk::{NodeId, Tree, Version, ROOT_ID};
use arbor_tree::{NodeData, TreeChange};
use colored::Colorize;
use serde_json::{json, Value};

/// Indented outline of a tree, children grouped by role.
pub fn tree_text(tree: &Tree) -> anyhow::Result<String> {
    let nodes = load_nodes(tree)?;
    let mut out = String::new();
    write_node(&mut out, &nodes, ROOT_ID, 0)?;
    Ok(out)
}

fn load_nodes(tree: &Tree) -> anyhow::Result<HashMap<NodeId, NodeData>> {
    let ids = tree.descendants(ROOT_ID, true)?;
    Ok(tree.get_nodes(&ids)?)
}

fn write_node(out: &mut String, nodes: &HashMap<NodeId, NodeData>, id: NodeId, depth: usize) -> anyhow::Result<()> {
    let Some(node) = nodes.get(&id) else {
        anyhow::bail!("node {id:#x} missing from tree");
    };
    let indent = "  ".repeat(depth);
    write!(out, "{indent}{}", format!("{id:#x}").yellow())?;
    if let Some(concept) = &node.concept {
        write!(out, " : {}", concept.to_string().bold())?;
    }
    for (role, value) in &node.properties {
        write!(out, " {role}={value:?}")?;
    }
    for (role, target) in &node.references {
        write!(out, " {role}->{target}")?;
    }
    writeln!(out)?;
    for link in &node.children {
        let role = link.role.as_deref().unwrap_or("<default>");
        writeln!(out, "{indent}  {}", format!("[{role}]").cyan())?;
        for child in &link.ids {
            write_node(out, nodes, *child, depth + 2)?;
        }
    }
    Ok(())
}

/// Tree identity plus every node record, root first.
pub fn tree_json(tree: &Tree) -> anyhow::Result<Value> {
    let ids = tree.descendants(ROOT_ID, true)?;
    let mut nodes = tree.get_nodes(&ids)?;
    let records = ids
        .iter()
        .filter_map(|id| nodes.remove(id))
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({
        "id": tree.id().to_string(),
        "hash": tree.hash().to_hex(),
        "uses_role_ids": tree.uses_role_ids(),
        "nodes": records,
    }))
}

pub fn version_json(version: &Version) -> Value {
    json!({
        "hash": version.hash().to_hex(),
        "id": version.id(),
        "tree": version.tree_hash().to_hex(),
        "lineage": version.lineage(),
        "operations": version.operations().len(),
    })
}

/// Changes from `old` to `new`, one per line.
pub fn changes_text(new: &Tree, old: &Tree) -> anyhow::Result<Vec<String>> {
    let mut changes: Vec<TreeChange> = Vec::new();
    new.visit_changes(old, &mut changes)?;
    Ok(changes
        .iter()
        .map(|change| match change {
            TreeChange::PropertyChanged { node, role } => format!("property {node:#x}.{role}"),
            TreeChange::ReferenceChanged { node, role } => format!("reference {node:#x}.{role}"),
            TreeChange::ChildrenChanged { node, role } => {
                format!("children {node:#x}.{}", role.as_deref().unwrap_or("<default>"))
            }
            TreeChange::ContainmentChanged { node } => format!("containment {node:#x}"),
            TreeChange::NodeAdded { node } => format!("added {node:#x}"),
            TreeChange::NodeRemoved { node } => format!("removed {node:#x}"),
        })
        .collect())
}
