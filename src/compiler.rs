//! Policy-to-FDD compilation
//!
//! Structural recursion from the [`crate::policy`] AST to an
//! [`crate::fdd::Fdd`] handle (§4.4), plus `specialize`, which partially
//! evaluates a policy against a chosen switch before compiling it.

use tracing::info;

use crate::cache::Cache;
use crate::fdd::{self, Fdd, FddError};
use crate::field::{Field, Value};
use crate::options::Options;
use crate::policy::{Policy, Pred, SwitchId};

/// Errors raised while compiling a policy.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("policy contains a Link term, which only compile_global may lower")]
    NonLocal,
    #[error(transparent)]
    Fdd(#[from] FddError),
}

fn of_pred(cache: &Cache, pred: &Pred) -> Result<Fdd, CompileError> {
    Ok(match pred {
        Pred::True => fdd::mk_true(cache),
        Pred::False => fdd::mk_false(cache),
        Pred::Test(field, value) => {
            let test = crate::field::Test { field: *field, value: value.clone() };
            fdd::mk_test(cache, &test)
        }
        Pred::Neg(p) => fdd::negate(cache, of_pred(cache, p)?)?,
        Pred::And(a, b) => fdd::seq(cache, of_pred(cache, a)?, of_pred(cache, b)?),
        Pred::Or(a, b) => fdd::union(cache, of_pred(cache, a)?, of_pred(cache, b)?),
    })
}

/// `of_policy`: structural recursion from the AST to an FDD (§4.4). Fails
/// with [`CompileError::NonLocal`] the moment a `Link` term is reached —
/// callers that have already lowered links (`compile_global`) never hit it.
pub fn of_policy(cache: &Cache, policy: &Policy) -> Result<Fdd, CompileError> {
    Ok(match policy {
        Policy::Filter(p) => of_pred(cache, p)?,
        Policy::Mod(field, value) => {
            let m = crate::field::Modification { field: *field, value: value.clone() };
            fdd::mk_mod(cache, &m)
        }
        Policy::Union(a, b) => fdd::union(cache, of_policy(cache, a)?, of_policy(cache, b)?),
        Policy::Seq(a, b) => fdd::seq(cache, of_policy(cache, a)?, of_policy(cache, b)?),
        Policy::Star(p) => fdd::star(cache, of_policy(cache, p)?),
        Policy::Link(..) => return Err(CompileError::NonLocal),
    })
}

/// Partially evaluate `Test(Switch, s)` to `True` for the chosen switch and
/// `False` for every other switch test, then fold the usual Boolean/regular
/// identities (short-circuit through `And`/`Or`, absorb through `Seq`/
/// `Union`, collapse `Star(True)`/`Star(False)`).
#[must_use]
pub fn specialize(policy: &Policy, switch: SwitchId) -> Policy {
    specialize_policy(policy, switch)
}

fn specialize_pred(pred: &Pred, switch: SwitchId) -> Pred {
    match pred {
        Pred::True | Pred::False => pred.clone(),
        Pred::Test(Field::Switch, Value::Const(s)) => {
            if *s == switch {
                Pred::True
            } else {
                Pred::False
            }
        }
        Pred::Test(..) => pred.clone(),
        Pred::Neg(p) => match specialize_pred(p, switch) {
            Pred::True => Pred::False,
            Pred::False => Pred::True,
            p => Pred::neg(p),
        },
        Pred::And(a, b) => match (specialize_pred(a, switch), specialize_pred(b, switch)) {
            (Pred::False, _) | (_, Pred::False) => Pred::False,
            (Pred::True, p) | (p, Pred::True) => p,
            (a, b) => Pred::and(a, b),
        },
        Pred::Or(a, b) => match (specialize_pred(a, switch), specialize_pred(b, switch)) {
            (Pred::True, _) | (_, Pred::True) => Pred::True,
            (Pred::False, p) | (p, Pred::False) => p,
            (a, b) => Pred::or(a, b),
        },
    }
}

fn specialize_policy(policy: &Policy, switch: SwitchId) -> Policy {
    match policy {
        Policy::Filter(p) => Policy::Filter(specialize_pred(p, switch)),
        Policy::Mod(..) | Policy::Link(..) => policy.clone(),
        Policy::Union(a, b) => {
            match (specialize_policy(a, switch), specialize_policy(b, switch)) {
                (Policy::Filter(Pred::False), p) | (p, Policy::Filter(Pred::False)) => p,
                (a, b) => Policy::union(a, b),
            }
        }
        Policy::Seq(a, b) => match (specialize_policy(a, switch), specialize_policy(b, switch)) {
            (Policy::Filter(Pred::False), _) | (_, Policy::Filter(Pred::False)) => {
                Policy::Filter(Pred::False)
            }
            (Policy::Filter(Pred::True), p) | (p, Policy::Filter(Pred::True)) => p,
            (a, b) => Policy::seq(a, b),
        },
        Policy::Star(p) => match specialize_policy(p, switch) {
            Policy::Filter(Pred::False) => Policy::Filter(Pred::True),
            Policy::Filter(Pred::True) => Policy::Filter(Pred::True),
            p => Policy::star(p),
        },
    }
}

/// Compile a policy that is already free of `Link` terms, optionally
/// specializing it to one switch first. Fails with
/// [`CompileError::NonLocal`] if a `Link` is reached.
pub fn compile_local(
    cache: &Cache,
    policy: &Policy,
    switch: Option<SwitchId>,
    options: &Options,
) -> Result<Fdd, CompileError> {
    options.cache_prepare.apply(cache);
    let policy = match switch {
        Some(sw) => specialize(policy, sw),
        None => policy.clone(),
    };
    let fdd = of_policy(cache, &policy)?;
    let fdd = if options.dedup_flows { fdd::dedup(cache, fdd) } else { fdd };
    let (reachable, expanded) = fdd::compression_ratio(cache, fdd);
    info!(reachable, expanded, "compile_local finished");
    Ok(fdd)
}

/// Compile a policy that has already had its `Link` terms lowered elsewhere
/// (the lowering itself is an external collaborator, §1).
pub fn compile_global(
    cache: &Cache,
    policy: &Policy,
    switch: Option<SwitchId>,
    options: &Options,
) -> Result<Fdd, CompileError> {
    if !policy.is_local() {
        return Err(CompileError::NonLocal);
    }
    compile_local(cache, policy, switch, options)
}
