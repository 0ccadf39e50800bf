//! Overload selection by arity and implicit conversion rank.

use super::entity::{FunctionEntity, FunctionIndex};
use super::scope::{ScopeArena, ScopeId};
use super::types::{conversion_rank, ConversionRank, Inferred};

/// Outcome of choosing among the candidates found by name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Chosen(FunctionIndex),
    /// An argument depends on a template parameter
    Dependent,
    /// Several candidates remain and some argument type is unknown
    Undecidable,
    Ambiguous,
    NoViable,
}

/// A call site as seen by overload selection.
pub struct CallSite<'a> {
    pub args: &'a [Inferred],
    /// Constness of the object for member calls
    pub object_const: Option<bool>,
    /// Scope the call appears in
    pub scope: ScopeId,
}

pub fn select(
    candidates: &[FunctionIndex],
    functions: &[FunctionEntity],
    scopes: &ScopeArena,
    site: &CallSite<'_>,
) -> Selection {
    if site.args.iter().any(|arg| matches!(arg, Inferred::Dependent)) {
        return Selection::Dependent;
    }

    let viable: Vec<FunctionIndex> = candidates
        .iter()
        .copied()
        .filter(|index| {
            let f = &functions[index.0];
            f.accepts_arity(site.args.len()) && !(site.object_const == Some(true) && f.is_instance_member() && !f.is_const)
        })
        .collect();
    if viable.is_empty() {
        return Selection::NoViable;
    }

    let ranked: Vec<(FunctionIndex, Vec<ConversionRank>)> = viable
        .into_iter()
        .filter_map(|index| rank(&functions[index.0], scopes, site).map(|ranks| (index, ranks)))
        .collect();

    match ranked.len() {
        0 => return Selection::NoViable,
        1 => return Selection::Chosen(ranked[0].0),
        _ => {}
    }
    if site.args.iter().any(|arg| matches!(arg, Inferred::Unknown)) {
        return Selection::Undecidable;
    }

    let best: Vec<FunctionIndex> = ranked
        .iter()
        .filter(|(index, ranks)| {
            ranked.iter().all(|(other, other_ranks)| {
                other == index
                    || is_better(
                        (&functions[index.0], ranks),
                        (&functions[other.0], other_ranks),
                        site.object_const,
                    )
            })
        })
        .map(|(index, _)| *index)
        .collect();

    match best.as_slice() {
        [single] => Selection::Chosen(*single),
        _ => Selection::Ambiguous,
    }
}

fn rank(function: &FunctionEntity, scopes: &ScopeArena, site: &CallSite<'_>) -> Option<Vec<ConversionRank>> {
    let env = scopes.environment(site.scope);
    let params: Vec<_> = function.params.iter().filter(|p| !p.is_pack).collect();
    let has_pack = function.params.iter().any(|p| p.is_pack);

    site.args
        .iter()
        .enumerate()
        .map(|(position, arg)| {
            let Inferred::Known(arg) = arg else {
                return Some(ConversionRank::Exact);
            };
            if function.unspecified_params {
                return Some(ConversionRank::Exact);
            }
            match params.get(position) {
                Some(param) => {
                    let param_ty = scopes.canonical_type(function.scope, &param.ty);
                    conversion_rank(arg, &param_ty, &env)
                }
                None if has_pack => Some(ConversionRank::Exact),
                None => Some(ConversionRank::Ellipsis),
            }
        })
        .collect()
}

/// `a` is better than `b`: no worse in any argument and strictly better in
/// one, or otherwise tied with a non-template beating a template.
fn is_better(
    (a, a_ranks): (&FunctionEntity, &Vec<ConversionRank>),
    (b, b_ranks): (&FunctionEntity, &Vec<ConversionRank>),
    object_const: Option<bool>,
) -> bool {
    let no_worse = a_ranks.iter().zip(b_ranks).all(|(x, y)| x <= y);
    if !no_worse {
        return false;
    }
    if a_ranks.iter().zip(b_ranks).any(|(x, y)| x < y) {
        return true;
    }
    if let Some(object_const) = object_const {
        if a.is_const == object_const && b.is_const != object_const {
            return true;
        }
    }
    // On a full tie a non-template beats a template.
    !a.is_template && b.is_template
}
