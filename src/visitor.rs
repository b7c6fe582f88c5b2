use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;

use crate::boolean::BooleanFormulaManager;
use crate::creator::{BoolOf, FormulaCreator, FormulaOf};
use crate::error::{Result, SolverError};
use crate::generalized::{ConstantValue, GeneralConverter, Quantifier, TermKind};
use crate::term::BooleanFormula;

/// What a recursive traversal does after visiting a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalProcess {
    Continue,
    /// Do not descend into the children of this node.
    Skip,
    Abort,
}

/// Callbacks for the canonical boolean connectives. Operands arrive already
/// encapsulated; anything that is not a connective is an atom.
pub trait BooleanFormulaVisitor<C: GeneralConverter, R> {
    fn visit_true(&mut self) -> Result<R>;
    fn visit_false(&mut self) -> Result<R>;
    fn visit_atom(&mut self, atom: &BoolOf<C>) -> Result<R>;
    fn visit_not(&mut self, operand: &BoolOf<C>) -> Result<R>;
    fn visit_and(&mut self, operands: &[BoolOf<C>]) -> Result<R>;
    fn visit_or(&mut self, operands: &[BoolOf<C>]) -> Result<R>;
    fn visit_equivalence(&mut self, operand1: &BoolOf<C>, operand2: &BoolOf<C>) -> Result<R>;
    fn visit_implication(&mut self, operand1: &BoolOf<C>, operand2: &BoolOf<C>) -> Result<R>;
    fn visit_if_then_else(
        &mut self,
        condition: &BoolOf<C>,
        then_formula: &BoolOf<C>,
        else_formula: &BoolOf<C>,
    ) -> Result<R>;
    fn visit_quantifier(
        &mut self,
        quantified: &BoolOf<C>,
        quantifier: Quantifier,
        body: &BoolOf<C>,
    ) -> Result<R>;
}

/// A rewrite of boolean formulas that handles every distinct sub-formula once.
///
/// Implementors supply the manager and a cache and override the `transform_*`
/// hooks they care about. The defaults rebuild the node from the transformed
/// operands, so the plain transformation is the identity.
pub trait BooleanFormulaTransformation<C: GeneralConverter>: Sized {
    fn manager(&self) -> BooleanFormulaManager<C>;
    fn cache(&mut self) -> &mut FxHashMap<BoolOf<C>, BoolOf<C>>;

    fn visit_if_not_seen(&mut self, formula: &BoolOf<C>) -> Result<BoolOf<C>> {
        if let Some(done) = self.cache().get(formula) {
            return Ok(done.clone());
        }
        let manager = self.manager();
        let out = manager.visit(formula, self)?;
        self.cache().insert(formula.clone(), out.clone());
        Ok(out)
    }

    fn visit_all_if_not_seen(&mut self, operands: &[BoolOf<C>]) -> Result<Vec<BoolOf<C>>> {
        operands
            .iter()
            .map(|operand| self.visit_if_not_seen(operand))
            .collect()
    }

    fn transform_true(&mut self) -> Result<BoolOf<C>> {
        self.manager().make_true()
    }

    fn transform_false(&mut self) -> Result<BoolOf<C>> {
        self.manager().make_false()
    }

    fn transform_atom(&mut self, atom: &BoolOf<C>) -> Result<BoolOf<C>> {
        Ok(atom.clone())
    }

    fn transform_not(&mut self, operand: &BoolOf<C>) -> Result<BoolOf<C>> {
        let operand = self.visit_if_not_seen(operand)?;
        self.manager().not(&operand)
    }

    fn transform_and(&mut self, operands: &[BoolOf<C>]) -> Result<BoolOf<C>> {
        let operands = self.visit_all_if_not_seen(operands)?;
        self.manager().and_all(&operands)
    }

    fn transform_or(&mut self, operands: &[BoolOf<C>]) -> Result<BoolOf<C>> {
        let operands = self.visit_all_if_not_seen(operands)?;
        self.manager().or_all(&operands)
    }

    fn transform_equivalence(&mut self, operand1: &BoolOf<C>, operand2: &BoolOf<C>) -> Result<BoolOf<C>> {
        let operand1 = self.visit_if_not_seen(operand1)?;
        let operand2 = self.visit_if_not_seen(operand2)?;
        self.manager().equivalence(&operand1, &operand2)
    }

    fn transform_implication(&mut self, operand1: &BoolOf<C>, operand2: &BoolOf<C>) -> Result<BoolOf<C>> {
        let operand1 = self.visit_if_not_seen(operand1)?;
        let operand2 = self.visit_if_not_seen(operand2)?;
        self.manager().implication(&operand1, &operand2)
    }

    fn transform_if_then_else(
        &mut self,
        condition: &BoolOf<C>,
        then_formula: &BoolOf<C>,
        else_formula: &BoolOf<C>,
    ) -> Result<BoolOf<C>> {
        let condition = self.visit_if_not_seen(condition)?;
        let then_formula = self.visit_if_not_seen(then_formula)?;
        let else_formula = self.visit_if_not_seen(else_formula)?;
        self.manager()
            .if_then_else_boolean(&condition, &then_formula, &else_formula)
    }

    fn transform_quantifier(
        &mut self,
        quantified: &BoolOf<C>,
        _quantifier: Quantifier,
        body: &BoolOf<C>,
    ) -> Result<BoolOf<C>> {
        // The bound variables already live inside the body.
        let body = self.visit_if_not_seen(body)?;
        let manager = self.manager();
        let creator = manager.creator();
        let term = creator.extract_boolean(quantified)?;
        let rebuilt = creator
            .converter()
            .replace_children(&term, &[creator.extract_boolean(&body)?])?;
        creator.encapsulate_boolean(rebuilt)
    }
}

impl<C, X> BooleanFormulaVisitor<C, BoolOf<C>> for X
where
    C: GeneralConverter,
    X: BooleanFormulaTransformation<C>,
{
    fn visit_true(&mut self) -> Result<BoolOf<C>> {
        self.transform_true()
    }

    fn visit_false(&mut self) -> Result<BoolOf<C>> {
        self.transform_false()
    }

    fn visit_atom(&mut self, atom: &BoolOf<C>) -> Result<BoolOf<C>> {
        self.transform_atom(atom)
    }

    fn visit_not(&mut self, operand: &BoolOf<C>) -> Result<BoolOf<C>> {
        self.transform_not(operand)
    }

    fn visit_and(&mut self, operands: &[BoolOf<C>]) -> Result<BoolOf<C>> {
        self.transform_and(operands)
    }

    fn visit_or(&mut self, operands: &[BoolOf<C>]) -> Result<BoolOf<C>> {
        self.transform_or(operands)
    }

    fn visit_equivalence(&mut self, operand1: &BoolOf<C>, operand2: &BoolOf<C>) -> Result<BoolOf<C>> {
        self.transform_equivalence(operand1, operand2)
    }

    fn visit_implication(&mut self, operand1: &BoolOf<C>, operand2: &BoolOf<C>) -> Result<BoolOf<C>> {
        self.transform_implication(operand1, operand2)
    }

    fn visit_if_then_else(
        &mut self,
        condition: &BoolOf<C>,
        then_formula: &BoolOf<C>,
        else_formula: &BoolOf<C>,
    ) -> Result<BoolOf<C>> {
        self.transform_if_then_else(condition, then_formula, else_formula)
    }

    fn visit_quantifier(
        &mut self,
        quantified: &BoolOf<C>,
        quantifier: Quantifier,
        body: &BoolOf<C>,
    ) -> Result<BoolOf<C>> {
        self.transform_quantifier(quantified, quantifier, body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    pub kind: TermKind,
}

impl FunctionInfo {
    pub fn is_uninterpreted(&self) -> bool {
        self.kind == TermKind::Uf
    }
}

pub type Rebuild<'a, C> = dyn Fn(&[FormulaOf<C>]) -> Result<FormulaOf<C>> + 'a;
pub type RebuildBody<'a, C> = dyn Fn(&BoolOf<C>) -> Result<BoolOf<C>> + 'a;

/// Callbacks for every kind of term, boolean or not.
pub trait FormulaVisitor<C: GeneralConverter, R> {
    fn visit_free_variable(&mut self, formula: &FormulaOf<C>, name: &str) -> Result<R>;
    fn visit_bound_variable(&mut self, formula: &FormulaOf<C>, de_bruijn_index: u32) -> Result<R>;
    fn visit_constant(&mut self, formula: &FormulaOf<C>, value: &ConstantValue) -> Result<R>;
    /// `rebuild` makes the same application over new arguments.
    fn visit_function(
        &mut self,
        formula: &FormulaOf<C>,
        args: &[FormulaOf<C>],
        function: &FunctionInfo,
        rebuild: &Rebuild<'_, C>,
    ) -> Result<R>;
    /// `rebuild` makes the same quantifier over a new body.
    fn visit_quantifier(
        &mut self,
        formula: &BoolOf<C>,
        quantifier: Quantifier,
        body: &BoolOf<C>,
        rebuild: &RebuildBody<'_, C>,
    ) -> Result<R>;
}

pub fn visit_formula<C, R, V>(
    creator: &FormulaCreator<C>,
    formula: &FormulaOf<C>,
    visitor: &mut V,
) -> Result<R>
where
    C: GeneralConverter,
    V: FormulaVisitor<C, R> + ?Sized,
{
    let converter = creator.converter();
    let term = creator.extract(formula)?;
    let kind = converter.term_kind(&term)?;
    match kind {
        TermKind::Variable => {
            let name = converter.symbol_name(&term)?;
            visitor.visit_free_variable(formula, &name)
        }
        TermKind::BoundVariable(index) => visitor.visit_bound_variable(formula, index),
        TermKind::True | TermKind::False | TermKind::Value => {
            let value = converter.constant_value(&term)?.ok_or_else(|| {
                SolverError::InvalidArgument(format!(
                    "{} has no constant value",
                    converter.dump(&term).unwrap_or_default()
                ))
            })?;
            visitor.visit_constant(formula, &value)
        }
        TermKind::Quantifier(quantifier) => {
            let quantified = BooleanFormula::try_from(formula.clone())?;
            let body = match converter.children(&term)?.into_iter().next() {
                Some(body) => creator.encapsulate_boolean(body)?,
                None => {
                    return Err(SolverError::InvalidArgument(
                        "quantifier without body".to_string(),
                    ))
                }
            };
            let rebuild = |new_body: &BoolOf<C>| -> Result<BoolOf<C>> {
                let new_body = creator.extract_boolean(new_body)?;
                creator.encapsulate_boolean(converter.replace_children(&term, &[new_body])?)
            };
            visitor.visit_quantifier(&quantified, quantifier, &body, &rebuild)
        }
        kind => {
            let args = converter
                .children(&term)?
                .into_iter()
                .map(|child| creator.encapsulate_with_type_of(child))
                .collect::<Result<Vec<_>>>()?;
            let function = FunctionInfo {
                name: converter.symbol_name(&term)?,
                kind,
            };
            let rebuild = |new_args: &[FormulaOf<C>]| -> Result<FormulaOf<C>> {
                let new_args = creator.extract_all(new_args)?;
                let rebuilt = converter.replace_children(&term, &new_args)?;
                creator.encapsulate(formula.formula_type(), rebuilt)
            };
            visitor.visit_function(formula, &args, &function, &rebuild)
        }
    }
}

/// Visits every distinct sub-term once, parents before children.
pub fn visit_formula_recursively<C, V>(
    creator: &FormulaCreator<C>,
    formula: &FormulaOf<C>,
    visitor: &mut V,
) -> Result<()>
where
    C: GeneralConverter,
    V: FormulaVisitor<C, TraversalProcess> + ?Sized,
{
    let mut seen = FxHashSet::default();
    let mut pending = vec![formula.clone()];
    while let Some(current) = pending.pop() {
        if !seen.insert(current.clone()) {
            continue;
        }
        match visit_formula(creator, &current, visitor)? {
            TraversalProcess::Abort => return Ok(()),
            TraversalProcess::Skip => {}
            TraversalProcess::Continue => {
                let term = creator.extract(&current)?;
                for child in creator.converter().children(&term)?.into_iter().rev() {
                    pending.push(creator.encapsulate_with_type_of(child)?);
                }
            }
        }
    }
    Ok(())
}

struct SymbolCollector<C: GeneralConverter> {
    include_ufs: bool,
    found: BTreeMap<String, FormulaOf<C>>,
}

impl<C: GeneralConverter> FormulaVisitor<C, TraversalProcess> for SymbolCollector<C> {
    fn visit_free_variable(&mut self, formula: &FormulaOf<C>, name: &str) -> Result<TraversalProcess> {
        self.found.insert(name.to_string(), formula.clone());
        Ok(TraversalProcess::Continue)
    }

    fn visit_bound_variable(&mut self, _formula: &FormulaOf<C>, _index: u32) -> Result<TraversalProcess> {
        Ok(TraversalProcess::Continue)
    }

    fn visit_constant(&mut self, _formula: &FormulaOf<C>, _value: &ConstantValue) -> Result<TraversalProcess> {
        Ok(TraversalProcess::Continue)
    }

    fn visit_function(
        &mut self,
        formula: &FormulaOf<C>,
        _args: &[FormulaOf<C>],
        function: &FunctionInfo,
        _rebuild: &Rebuild<'_, C>,
    ) -> Result<TraversalProcess> {
        if self.include_ufs && function.is_uninterpreted() {
            self.found.insert(function.name.clone(), formula.clone());
        }
        Ok(TraversalProcess::Continue)
    }

    fn visit_quantifier(
        &mut self,
        _formula: &BoolOf<C>,
        _quantifier: Quantifier,
        _body: &BoolOf<C>,
        _rebuild: &RebuildBody<'_, C>,
    ) -> Result<TraversalProcess> {
        Ok(TraversalProcess::Continue)
    }
}

/// Free variables of `formula` by name.
pub fn extract_variables<C: GeneralConverter>(
    creator: &FormulaCreator<C>,
    formula: &FormulaOf<C>,
) -> Result<BTreeMap<String, FormulaOf<C>>> {
    collect_symbols(creator, formula, false)
}

/// Free variables and uninterpreted function applications of `formula` by name.
/// Of several applications of one function only one is kept.
pub fn extract_variables_and_ufs<C: GeneralConverter>(
    creator: &FormulaCreator<C>,
    formula: &FormulaOf<C>,
) -> Result<BTreeMap<String, FormulaOf<C>>> {
    collect_symbols(creator, formula, true)
}

fn collect_symbols<C: GeneralConverter>(
    creator: &FormulaCreator<C>,
    formula: &FormulaOf<C>,
    include_ufs: bool,
) -> Result<BTreeMap<String, FormulaOf<C>>> {
    let mut collector = SymbolCollector {
        include_ufs,
        found: BTreeMap::new(),
    };
    visit_formula_recursively(creator, formula, &mut collector)?;
    Ok(collector.found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::{DummyContext, DummySort};
    use crate::generalized::{GeneralBoolConverter, GeneralNumeralConverter};
    use crate::options::Options;
    use crate::term::FormulaType;
    use num_rational::BigRational;
    use std::rc::Rc;

    fn manager() -> BooleanFormulaManager<DummyContext> {
        let context = Rc::new(DummyContext::new());
        let creator = FormulaCreator::new(context, &Options::default()).unwrap();
        BooleanFormulaManager::new(Rc::new(creator))
    }

    struct CountingIdentity {
        manager: BooleanFormulaManager<DummyContext>,
        cache: FxHashMap<BoolOf<DummyContext>, BoolOf<DummyContext>>,
        atoms: usize,
    }

    impl BooleanFormulaTransformation<DummyContext> for CountingIdentity {
        fn manager(&self) -> BooleanFormulaManager<DummyContext> {
            self.manager.clone()
        }

        fn cache(&mut self) -> &mut FxHashMap<BoolOf<DummyContext>, BoolOf<DummyContext>> {
            &mut self.cache
        }

        fn transform_atom(&mut self, atom: &BoolOf<DummyContext>) -> Result<BoolOf<DummyContext>> {
            self.atoms += 1;
            Ok(atom.clone())
        }
    }

    /// Conjunction tree of depth `depth` whose every level reuses the one below twice.
    fn shared_tower(
        bmgr: &BooleanFormulaManager<DummyContext>,
        leaves: &[BoolOf<DummyContext>],
        depth: usize,
    ) -> BoolOf<DummyContext> {
        let mut current = bmgr.or_all(leaves).unwrap();
        for level in 0..depth {
            let side = bmgr.make_variable(&format!("s{}", level)).unwrap();
            let left = bmgr.implication(&side, &current).unwrap();
            let right = bmgr.implication(&bmgr.not(&side).unwrap(), &current).unwrap();
            current = bmgr.and(&left, &right).unwrap();
        }
        current
    }

    #[test]
    fn transformation_visits_shared_atoms_once() {
        let bmgr = manager();
        let leaves: Vec<_> = (0..3)
            .map(|i| bmgr.make_variable(&format!("x{}", i)).unwrap())
            .collect();
        for depth in [1, 5, 20] {
            let formula = shared_tower(&bmgr, &leaves, depth);
            let mut identity = CountingIdentity {
                manager: bmgr.clone(),
                cache: FxHashMap::default(),
                atoms: 0,
            };
            let result = bmgr.transform_recursively(&formula, &mut identity).unwrap();
            assert_eq!(result, formula);
            assert_eq!(identity.atoms, leaves.len() + depth);
        }
    }

    struct Renamer {
        manager: BooleanFormulaManager<DummyContext>,
        cache: FxHashMap<BoolOf<DummyContext>, BoolOf<DummyContext>>,
    }

    impl BooleanFormulaTransformation<DummyContext> for Renamer {
        fn manager(&self) -> BooleanFormulaManager<DummyContext> {
            self.manager.clone()
        }

        fn cache(&mut self) -> &mut FxHashMap<BoolOf<DummyContext>, BoolOf<DummyContext>> {
            &mut self.cache
        }

        fn transform_atom(&mut self, _atom: &BoolOf<DummyContext>) -> Result<BoolOf<DummyContext>> {
            self.manager.make_variable("fresh")
        }
    }

    #[test]
    fn transformation_rebuilds_parents() {
        let bmgr = manager();
        let a = bmgr.make_variable("a").unwrap();
        let b = bmgr.make_variable("b").unwrap();
        let formula = bmgr.or(&bmgr.not(&a).unwrap(), &b).unwrap();
        let mut renamer = Renamer {
            manager: bmgr.clone(),
            cache: FxHashMap::default(),
        };
        let fresh = bmgr.make_variable("fresh").unwrap();
        let expected = bmgr.or(&bmgr.not(&fresh).unwrap(), &fresh).unwrap();
        assert_eq!(bmgr.transform_recursively(&formula, &mut renamer).unwrap(), expected);
    }

    struct Trace(Vec<String>);

    impl BooleanFormulaVisitor<DummyContext, TraversalProcess> for Trace {
        fn visit_true(&mut self) -> Result<TraversalProcess> {
            self.0.push("true".into());
            Ok(TraversalProcess::Continue)
        }
        fn visit_false(&mut self) -> Result<TraversalProcess> {
            self.0.push("false".into());
            Ok(TraversalProcess::Continue)
        }
        fn visit_atom(&mut self, _atom: &BoolOf<DummyContext>) -> Result<TraversalProcess> {
            self.0.push("atom".into());
            Ok(TraversalProcess::Continue)
        }
        fn visit_not(&mut self, _operand: &BoolOf<DummyContext>) -> Result<TraversalProcess> {
            self.0.push("not".into());
            Ok(TraversalProcess::Skip)
        }
        fn visit_and(&mut self, _operands: &[BoolOf<DummyContext>]) -> Result<TraversalProcess> {
            self.0.push("and".into());
            Ok(TraversalProcess::Continue)
        }
        fn visit_or(&mut self, _operands: &[BoolOf<DummyContext>]) -> Result<TraversalProcess> {
            self.0.push("or".into());
            Ok(TraversalProcess::Continue)
        }
        fn visit_equivalence(&mut self, _a: &BoolOf<DummyContext>, _b: &BoolOf<DummyContext>) -> Result<TraversalProcess> {
            self.0.push("iff".into());
            Ok(TraversalProcess::Continue)
        }
        fn visit_implication(&mut self, _a: &BoolOf<DummyContext>, _b: &BoolOf<DummyContext>) -> Result<TraversalProcess> {
            self.0.push("implies".into());
            Ok(TraversalProcess::Continue)
        }
        fn visit_if_then_else(
            &mut self,
            _c: &BoolOf<DummyContext>,
            _t: &BoolOf<DummyContext>,
            _e: &BoolOf<DummyContext>,
        ) -> Result<TraversalProcess> {
            self.0.push("ite".into());
            Ok(TraversalProcess::Continue)
        }
        fn visit_quantifier(
            &mut self,
            _q: &BoolOf<DummyContext>,
            _quantifier: Quantifier,
            _body: &BoolOf<DummyContext>,
        ) -> Result<TraversalProcess> {
            self.0.push("quantifier".into());
            Ok(TraversalProcess::Continue)
        }
    }

    #[test]
    fn recursive_visit_honours_skip() {
        let bmgr = manager();
        let a = bmgr.make_variable("a").unwrap();
        let b = bmgr.make_variable("b").unwrap();
        let formula = bmgr
            .and(&bmgr.not(&a).unwrap(), &bmgr.equivalence(&a, &b).unwrap())
            .unwrap();
        let mut trace = Trace(Vec::new());
        bmgr.visit_recursively(&formula, &mut trace).unwrap();
        assert_eq!(trace.0, vec!["and", "not", "iff", "atom", "atom"]);
    }

    #[test]
    fn numeric_equality_is_an_atom_and_boolean_distinct_is_rejected() {
        let bmgr = manager();
        let creator = bmgr.creator().clone();
        let converter = creator.converter().clone();
        let x = creator.make_variable(&FormulaType::Integer, "x").unwrap();
        let y = creator.make_variable(&FormulaType::Integer, "y").unwrap();
        let eq = creator
            .encapsulate_boolean(converter.mk_eq(&x, &y).unwrap())
            .unwrap();
        let mut trace = Trace(Vec::new());
        bmgr.visit(&eq, &mut trace).unwrap();
        assert_eq!(trace.0, vec!["atom"]);

        let p = creator.make_variable(&FormulaType::Boolean, "p").unwrap();
        let q = creator.make_variable(&FormulaType::Boolean, "q").unwrap();
        let three = creator
            .encapsulate_boolean(converter.mk_distinct(&[p, q, p]).unwrap())
            .unwrap();
        assert!(matches!(
            bmgr.visit(&three, &mut trace),
            Err(SolverError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn extracts_variables_and_ufs() {
        let bmgr = manager();
        let creator = bmgr.creator().clone();
        let converter = creator.converter().clone();
        let f = creator
            .declare_function("f", &[FormulaType::Integer], &FormulaType::Integer)
            .unwrap();
        let x = creator.make_variable(&FormulaType::Integer, "x").unwrap();
        let fx = converter.mk_app(f.decl(), &[x]).unwrap();
        let eq = converter.mk_eq(&fx, &x).unwrap();
        let p = bmgr.make_variable("p").unwrap();
        let formula = bmgr.and(&creator.encapsulate_boolean(eq).unwrap(), &p).unwrap();

        let variables = extract_variables(&creator, formula.as_formula()).unwrap();
        assert_eq!(variables.keys().cloned().collect::<Vec<_>>(), vec!["p", "x"]);
        let with_ufs = extract_variables_and_ufs(&creator, formula.as_formula()).unwrap();
        assert_eq!(with_ufs.keys().cloned().collect::<Vec<_>>(), vec!["f", "p", "x"]);
    }

    struct ArgumentSwapper;

    impl FormulaVisitor<DummyContext, FormulaOf<DummyContext>> for ArgumentSwapper {
        fn visit_free_variable(&mut self, formula: &FormulaOf<DummyContext>, _name: &str) -> Result<FormulaOf<DummyContext>> {
            Ok(formula.clone())
        }
        fn visit_bound_variable(&mut self, formula: &FormulaOf<DummyContext>, _index: u32) -> Result<FormulaOf<DummyContext>> {
            Ok(formula.clone())
        }
        fn visit_constant(&mut self, formula: &FormulaOf<DummyContext>, _value: &ConstantValue) -> Result<FormulaOf<DummyContext>> {
            Ok(formula.clone())
        }
        fn visit_function(
            &mut self,
            _formula: &FormulaOf<DummyContext>,
            args: &[FormulaOf<DummyContext>],
            _function: &FunctionInfo,
            rebuild: &Rebuild<'_, DummyContext>,
        ) -> Result<FormulaOf<DummyContext>> {
            let mut swapped = args.to_vec();
            swapped.reverse();
            rebuild(&swapped)
        }
        fn visit_quantifier(
            &mut self,
            formula: &BoolOf<DummyContext>,
            _quantifier: Quantifier,
            _body: &BoolOf<DummyContext>,
            _rebuild: &RebuildBody<'_, DummyContext>,
        ) -> Result<FormulaOf<DummyContext>> {
            Ok(formula.as_formula().clone())
        }
    }

    #[test]
    fn function_visit_can_rebuild() {
        let bmgr = manager();
        let creator = bmgr.creator().clone();
        let x = creator.make_variable(&FormulaType::Integer, "x").unwrap();
        let y = creator.make_variable(&FormulaType::Integer, "y").unwrap();
        let converter = creator.converter().clone();
        let lt = converter.mk_lt(&x, &y).unwrap();
        let swapped_lt = converter.mk_lt(&y, &x).unwrap();
        let formula = creator.encapsulate_with_type_of(lt).unwrap();
        let swapped = visit_formula(&creator, &formula, &mut ArgumentSwapper).unwrap();
        assert_eq!(creator.extract(&swapped).unwrap(), swapped_lt);

        let five = creator
            .encapsulate_with_type_of(
                converter
                    .mk_numeral(&BigRational::from_integer(5.into()), &DummySort::Int)
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(visit_formula(&creator, &five, &mut ArgumentSwapper).unwrap(), five);
    }
}
