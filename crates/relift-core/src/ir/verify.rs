//! IR invariant checking.
//!
//! Mutating the expression graph in place while keeping three bidirectional
//! links consistent (parent pointer, definition's uses list, user's def
//! pointer) is the single largest source of bugs in this kind of code, so
//! every pass is followed by a full check in debug builds. Violations are
//! logged and asserted on in debug; release builds skip the walk entirely.

use rustc_hash::{FxHashMap, FxHashSet};

use super::expr::{ExprId, ExprKind};
use super::function::Function;
use crate::analysis::Digraph;
use crate::ssa::SsaContext;

/// Collects every invariant violation in the function.
///
/// `graph` enables the phi-arity check (argument count versus predecessor
/// count); pass it only while phis are still block-shaped, i.e. before
/// relaxation may have folded argument lists.
pub fn verify(func: &Function, graph: Option<&Digraph>, ctx: Option<&SsaContext>) -> Vec<String> {
    let mut problems = Vec::new();
    let body = &func.body;

    let mut containers: Vec<_> = func.blocks.iter().map(|b| b.container).collect();
    containers.push(func.uninit);

    let mut reachable: FxHashSet<ExprId> = FxHashSet::default();
    let mut def_keys: FxHashMap<(String, u32), ExprId> = FxHashMap::default();

    for &cid in &containers {
        for &sid in &body.container(cid).stmts {
            if body.stmt(sid).parent != Some(cid) {
                problems.push(format!("{sid} not parented to its container"));
            }
            for &top in &body.stmt(sid).exprs {
                for n in body.subtree(top) {
                    reachable.insert(n);
                    let e = body.expr(n);

                    if let Some(def) = e.def {
                        let count = body.expr(def).uses.iter().filter(|&&u| u == n).count();
                        if count != 1 {
                            problems.push(format!(
                                "use {n} appears {count} times in uses of its definition {def}"
                            ));
                        }
                    }
                    if !e.uses.is_empty() && !e.is_def() {
                        problems.push(format!("{n} carries uses but is not a definition"));
                    }
                    for &u in &e.uses {
                        if body.expr(u).def != Some(n) {
                            problems.push(format!("{u} listed as reader of {n} but points away"));
                        }
                    }

                    if let ExprKind::Assign(lhs, _) = e.kind {
                        let le = body.expr(lhs);
                        if !le.is_def() {
                            problems.push(format!("assign lhs {lhs} not flagged as definition"));
                        }
                        if !le.kind.is_location() {
                            problems.push(format!("assign lhs {lhs} is not an assignable location"));
                        }
                        if le.is_def() && le.idx.is_some() {
                            if let Some(name) = body.base_name(lhs) {
                                let key = (name, le.idx.unwrap());
                                if let Some(&other) = def_keys.get(&key) {
                                    problems.push(format!(
                                        "definitions {other} and {lhs} share name and subscript {}_{}",
                                        key.0, key.1
                                    ));
                                } else {
                                    def_keys.insert(key, lhs);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    if let Some(ctx) = ctx {
        for (key, &def) in &ctx.defs {
            let e = body.expr(def);
            if !e.is_def() {
                problems.push(format!("context entry {key} is not a definition"));
            }
            if body.def_assign(def).is_none() {
                problems.push(format!("context entry {key} is not the lhs of an assignment"));
            }
            if !reachable.contains(&def) {
                problems.push(format!("context entry {key} unreachable from any statement"));
            }
        }
    }

    if let Some(graph) = graph {
        for block in &func.blocks {
            if !graph.contains(block.id) {
                continue;
            }
            let preds = graph.predecessors(block.id).len();
            for &sid in &body.container(block.container).stmts {
                let Some((_, phi)) = body.as_phi_stmt(sid) else {
                    break;
                };
                if let ExprKind::Phi(args) = &body.expr(phi).kind {
                    if args.len() != preds {
                        problems.push(format!(
                            "phi at {} has {} arguments for {} predecessors",
                            block.id,
                            args.len(),
                            preds
                        ));
                    }
                }
            }
        }
        // Phi statements must be grouped at the top of their container.
        for block in &func.blocks {
            let mut seen_non_phi = false;
            for &sid in &body.container(block.container).stmts {
                if body.as_phi_stmt(sid).is_some() {
                    if seen_non_phi {
                        problems.push(format!("phi below non-phi statement in {}", block.id));
                    }
                } else {
                    seen_non_phi = true;
                }
            }
        }
    }

    problems
}

/// Debug-build invariant gate: logs every violation and asserts. Release
/// builds skip the walk; the pipeline's policy there is log-and-continue
/// at the sites that detect concrete damage.
pub fn debug_verify(func: &Function, graph: Option<&Digraph>, ctx: Option<&SsaContext>, stage: &str) {
    if !cfg!(debug_assertions) {
        return;
    }
    let problems = verify(func, graph, ctx);
    for p in &problems {
        tracing::warn!(target: "relift::verify", stage, function = %func.name, "{p}");
    }
    debug_assert!(
        problems.is_empty(),
        "IR invariants violated after {stage} in `{}`: {problems:?}",
        func.name
    );
}

/// True when no expression in the function carries an SSA subscript.
pub fn subscripts_erased(func: &Function) -> bool {
    let mut containers: Vec<_> = func.blocks.iter().map(|b| b.container).collect();
    containers.push(func.uninit);
    for cid in containers {
        for &sid in &func.body.container(cid).stmts {
            for &top in &func.body.stmt(sid).exprs {
                for n in func.body.subtree(top) {
                    if func.body.expr(n).idx.is_some() {
                        return false;
                    }
                }
            }
        }
    }
    true
}
