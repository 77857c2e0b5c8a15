//! The chain compiler
//!
//! Drains a [`DeclarationQueue`] into a tree of nodes. Leaves come from the
//! [`NodeResolver`]; modifiers recurse into the compiler against the same queue, so
//! each modifier swallows as many sibling declarations as its count asks for.
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

use super::modifiers::{AllOf, Collect, Conditional, Each, FirstSuccess, Recover, TemplateOverride};
use crate::declaration::{CollectShape, Declaration, DeclarationQueue, FailureHandler, Modifier, Take};
use crate::error::{Error, Result};
use crate::node::{Callable, Composite, Node, Pipe};
use crate::record::{Direction, Record};
use crate::resolver::{NodeCache, NodeResolver};
use std::sync::Arc;

/// Builds pipelines out of field declarations
pub struct ChainCompiler {
    resolver: NodeResolver,
}

impl ChainCompiler {
    pub fn new(resolver: NodeResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &NodeResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<NodeCache> {
        self.resolver.cache()
    }

    /// Compile every declaration of one field into a single callable
    pub fn compile_field(
        &self,
        declarations: &[Declaration],
        owner: &dyn Record,
        direction: Direction,
    ) -> Result<Callable> {
        let mut queue = DeclarationQueue::new(declarations);
        let node = self.compile(&mut queue, owner, direction, Take::All)?;
        log::debug!(
            "compiled {} declarations for `{}` ({})",
            declarations.len(),
            owner.record_type(),
            direction
        );
        Ok(node.compile())
    }

    /// Consume `take` declarations from `queue` into one default-composed node
    pub fn compile(
        &self,
        queue: &mut DeclarationQueue<'_>,
        owner: &dyn Record,
        direction: Direction,
        take: Take,
    ) -> Result<Node> {
        let children = self.compile_children(queue, owner, direction, take, "chain")?;
        Ok(Node::Composite(Composite::new("Chain", children, Pipe)))
    }

    fn compile_children(
        &self,
        queue: &mut DeclarationQueue<'_>,
        owner: &dyn Record,
        direction: Direction,
        take: Take,
        label: &str,
    ) -> Result<Vec<Node>> {
        let mut children: Vec<Node> = Vec::new();
        consume(queue, take, label, |declaration, queue| {
            match declaration.as_modifier() {
                // Postfix: attaches to the node before it and takes no slot of its own
                Some(Modifier::FailTo { fallback, handler }) => {
                    check_handler(handler.as_ref(), owner, "FailTo")?;
                    let protected = children.pop().ok_or_else(|| {
                        Error::configuration("`FailTo` has no preceding node to recover")
                    })?;
                    let name = format!("FailTo({})", protected.name());
                    children.push(Node::Composite(Composite::new(
                        name,
                        vec![protected],
                        Recover::new(fallback.clone(), handler.clone()),
                    )));
                    return Ok(false);
                }
                Some(modifier) => {
                    let node = self.compile_modifier(modifier, queue, owner, direction)?;
                    children.push(node);
                }
                None => children.push(Node::Leaf(self.resolver.resolve(declaration, owner)?)),
            }
            Ok(true)
        })?;
        Ok(children)
    }

    fn compile_modifier(
        &self,
        modifier: &Modifier,
        queue: &mut DeclarationQueue<'_>,
        owner: &dyn Record,
        direction: Direction,
    ) -> Result<Node> {
        let name = modifier.name();

        if let Modifier::Groups { groups, .. } = modifier {
            let active = owner.active_groups(direction);
            if !groups.iter().any(|group| active.contains(group)) {
                log::trace!("groups {:?} inactive for `{}`, skipping", groups, owner.record_type());
                skip(queue, modifier.take(), name)?;
                return Ok(Node::Composite(Composite::new(name, Vec::new(), Pipe)));
            }
        }

        if let Modifier::FailNextTo { handler, .. } = modifier {
            check_handler(handler.as_ref(), owner, name)?;
        }

        let children = self.compile_children(queue, owner, direction, modifier.take(), name)?;
        let node = match modifier {
            Modifier::Wrap { .. } | Modifier::Groups { .. } => Composite::new(name, children, Pipe),
            Modifier::Each { .. } => Composite::new(name, children, Each),
            Modifier::Collect { shape } => {
                let labels = match shape {
                    CollectShape::Count(_) => None,
                    CollectShape::Labels(labels) => Some(labels.clone()),
                };
                Composite::new(name, children, Collect::new(labels))
            }
            Modifier::Any { .. } => Composite::new(name, children, FirstSuccess),
            Modifier::All { .. } => Composite::new(name, children, AllOf),
            Modifier::When {
                condition,
                negate,
                otherwise,
                ..
            } => {
                let predicate = self.resolver.resolve(condition, owner)?;
                Composite::new(
                    format!("When({})", predicate.name()),
                    children,
                    Conditional::new(
                        predicate.callable().clone(),
                        *negate,
                        otherwise.as_ref().map(|arg| arg.to_value()),
                    ),
                )
            }
            Modifier::FailNextTo {
                fallback, handler, ..
            } => Composite::new(name, children, Recover::new(fallback.clone(), handler.clone())),
            Modifier::ErrorTemplate { template, map, .. } => Composite::new(
                name,
                children,
                TemplateOverride::new(template.clone(), map.clone()),
            ),
            Modifier::FailTo { .. } => {
                return Err(Error::Internal {
                    message: "postfix modifier reached the modifier compiler".to_string(),
                    source: anyhow::anyhow!("`FailTo` is handled by its enclosing chain"),
                })
            }
        };
        Ok(Node::Composite(node))
    }
}

/// A record-method failure handler must exist on the owner
fn check_handler(handler: Option<&FailureHandler>, owner: &dyn Record, label: &str) -> Result<()> {
    match handler {
        Some(FailureHandler::RecordMethod(method)) if owner.method_arity(method).is_none() => {
            Err(Error::configuration(format!(
                "`{}` handler: record `{}` has no method `{}`",
                label,
                owner.record_type(),
                method
            )))
        }
        _ => Ok(()),
    }
}

/// Advance past `take` declarations without resolving them
fn skip(queue: &mut DeclarationQueue<'_>, take: Take, label: &str) -> Result<()> {
    consume(queue, take, label, |declaration, queue| match declaration.as_modifier() {
        Some(Modifier::FailTo { .. }) => Ok(false),
        Some(modifier) => {
            skip(queue, modifier.take(), modifier.name())?;
            Ok(true)
        }
        None => Ok(true),
    })
}

/// Pull declarations until `take` is satisfied. `visit` returns whether the
/// declaration occupied a slot.
fn consume<'a>(
    queue: &mut DeclarationQueue<'a>,
    take: Take,
    label: &str,
    mut visit: impl FnMut(&'a Declaration, &mut DeclarationQueue<'a>) -> Result<bool>,
) -> Result<()> {
    let mut found = Vec::new();
    let mut taken = 0;
    loop {
        if take == Take::Exactly(taken) {
            return Ok(());
        }
        let Some(declaration) = queue.next_declaration() else {
            return match take {
                Take::All => Ok(()),
                Take::Exactly(expected) => Err(Error::configuration(format!(
                    "`{}` expects {} declarations but found {}: [{}]",
                    label,
                    expected,
                    taken,
                    found.join(", ")
                ))),
            };
        };
        found.push(declaration.name());
        if visit(declaration, queue)? {
            taken += 1;
        }
    }
}
