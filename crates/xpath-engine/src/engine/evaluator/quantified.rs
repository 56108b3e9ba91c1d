//! `some` / `every`.

use std::sync::Arc;

use crate::compiler::expr::{Expr, expanded};
use crate::engine::runtime::{DynamicContext, Error, VariableBinding};
use crate::model::{QName, XdmNode};
use crate::xdm::{Sequence, XdmItem};

use super::{CancelPoll, boolean, evaluate};

/// Enumerates the Cartesian product of the clauses with an odometer: index 0 moves fastest and
/// carries into the next clause. All variables of one combination are bound in a single frame.
pub(crate) fn evaluate_quantified<N: XdmNode>(
    every: bool,
    bindings: &[(QName, Arc<Expr>)],
    satisfies: &Arc<Expr>,
    ctx: &DynamicContext<N>,
) -> Result<Sequence<N>, Error> {
    let mut domains: Vec<Vec<XdmItem<N>>> = Vec::with_capacity(bindings.len());
    for (_, source) in bindings {
        let items = evaluate(source, ctx)?.materialize()?;
        if items.is_empty() {
            return Ok(boolean(every));
        }
        domains.push(items);
    }
    let names: Vec<_> = bindings.iter().map(|(var, _)| expanded(var)).collect();
    let cancel = CancelPoll::of(ctx);
    let mut odometer = vec![0usize; domains.len()];
    loop {
        cancel.check()?;
        let frame = names
            .iter()
            .zip(&odometer)
            .zip(&domains)
            .map(|((name, &i), domain)| (name.clone(), VariableBinding::single(domain[i].clone())));
        let scope = ctx.bind_all(frame);
        let holds = evaluate(satisfies, &scope)?.ebv()?;
        if holds != every {
            return Ok(boolean(holds));
        }
        if !advance(&mut odometer, &domains) {
            return Ok(boolean(every));
        }
    }
}

fn advance<T>(odometer: &mut [usize], domains: &[Vec<T>]) -> bool {
    for (index, domain) in odometer.iter_mut().zip(domains) {
        *index += 1;
        if *index < domain.len() {
            return true;
        }
        *index = 0;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn odometer_visits_every_combination_once() {
        let domains = vec![vec![1, 2], vec![1, 2, 3]];
        let mut odometer = vec![0, 0];
        let mut seen = vec![odometer.clone()];
        while advance(&mut odometer, &domains) {
            seen.push(odometer.clone());
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[1], vec![1, 0]);
        assert_eq!(seen[2], vec![0, 1]);
    }
}
