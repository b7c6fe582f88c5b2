use rustc_hash::FxHashSet;
use std::rc::Rc;

use crate::creator::{BoolOf, FormulaCreator, FormulaOf};
use crate::error::{Result, SolverError};
use crate::generalized::{GeneralBoolConverter, GeneralConverter, TermKind};
use crate::term::{BooleanFormula, FormulaType};
use crate::visitor::{BooleanFormulaTransformation, BooleanFormulaVisitor, TraversalProcess};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Connective {
    And,
    Or,
}

/// Builds and inspects boolean formulas of one environment.
pub struct BooleanFormulaManager<C: GeneralConverter> {
    creator: Rc<FormulaCreator<C>>,
}

impl<C: GeneralConverter> Clone for BooleanFormulaManager<C> {
    fn clone(&self) -> Self {
        Self {
            creator: self.creator.clone(),
        }
    }
}

impl<C: GeneralConverter> BooleanFormulaManager<C> {
    pub fn new(creator: Rc<FormulaCreator<C>>) -> Self {
        Self { creator }
    }

    pub fn creator(&self) -> &Rc<FormulaCreator<C>> {
        &self.creator
    }

    fn native(&self) -> &dyn GeneralBoolConverter<C::Sort, C::Term> {
        self.creator.converter().bool_converter()
    }

    fn wrap(&self, term: C::Term) -> Result<BoolOf<C>> {
        self.creator.encapsulate_boolean(term)
    }

    fn kind(&self, term: &C::Term) -> Result<TermKind> {
        self.creator.converter().term_kind(term)
    }

    pub fn make_boolean(&self, value: bool) -> Result<BoolOf<C>> {
        self.wrap(self.native().mk_smt_bool(value)?)
    }

    pub fn make_true(&self) -> Result<BoolOf<C>> {
        self.make_boolean(true)
    }

    pub fn make_false(&self) -> Result<BoolOf<C>> {
        self.make_boolean(false)
    }

    pub fn make_variable(&self, name: &str) -> Result<BoolOf<C>> {
        self.wrap(self.creator.make_variable(&FormulaType::Boolean, name)?)
    }

    /// Syntactic check, `x or not x` is not recognized.
    pub fn is_true(&self, formula: &BoolOf<C>) -> Result<bool> {
        Ok(self.kind(&self.creator.extract_boolean(formula)?)? == TermKind::True)
    }

    /// Syntactic check, `x and not x` is not recognized.
    pub fn is_false(&self, formula: &BoolOf<C>) -> Result<bool> {
        Ok(self.kind(&self.creator.extract_boolean(formula)?)? == TermKind::False)
    }

    pub fn not(&self, formula: &BoolOf<C>) -> Result<BoolOf<C>> {
        let term = self.creator.extract_boolean(formula)?;
        if self.kind(&term)? == TermKind::Not {
            if let Some(operand) = self.creator.converter().children(&term)?.into_iter().next() {
                return self.wrap(operand);
            }
        }
        self.wrap(self.native().mk_not(&term)?)
    }

    pub fn and(&self, formula1: &BoolOf<C>, formula2: &BoolOf<C>) -> Result<BoolOf<C>> {
        let term1 = self.creator.extract_boolean(formula1)?;
        let term2 = self.creator.extract_boolean(formula2)?;
        if term1 == term2 || self.kind(&term2)? == TermKind::True {
            return Ok(formula1.clone());
        }
        if self.kind(&term1)? == TermKind::True {
            return Ok(formula2.clone());
        }
        self.binary(Connective::And, term1, term2)
    }

    pub fn or(&self, formula1: &BoolOf<C>, formula2: &BoolOf<C>) -> Result<BoolOf<C>> {
        let term1 = self.creator.extract_boolean(formula1)?;
        let term2 = self.creator.extract_boolean(formula2)?;
        if term1 == term2 || self.kind(&term2)? == TermKind::False {
            return Ok(formula1.clone());
        }
        if self.kind(&term1)? == TermKind::False {
            return Ok(formula2.clone());
        }
        self.binary(Connective::Or, term1, term2)
    }

    pub fn and_all(&self, operands: &[BoolOf<C>]) -> Result<BoolOf<C>> {
        self.nary(Connective::And, operands)
    }

    pub fn or_all(&self, operands: &[BoolOf<C>]) -> Result<BoolOf<C>> {
        self.nary(Connective::Or, operands)
    }

    pub fn xor(&self, formula1: &BoolOf<C>, formula2: &BoolOf<C>) -> Result<BoolOf<C>> {
        let iff = self.native().mk_iff(
            &self.creator.extract_boolean(formula1)?,
            &self.creator.extract_boolean(formula2)?,
        )?;
        self.wrap(self.native().mk_not(&iff)?)
    }

    pub fn equivalence(&self, formula1: &BoolOf<C>, formula2: &BoolOf<C>) -> Result<BoolOf<C>> {
        self.wrap(self.native().mk_iff(
            &self.creator.extract_boolean(formula1)?,
            &self.creator.extract_boolean(formula2)?,
        )?)
    }

    pub fn implication(&self, formula1: &BoolOf<C>, formula2: &BoolOf<C>) -> Result<BoolOf<C>> {
        self.wrap(self.native().mk_implies(
            &self.creator.extract_boolean(formula1)?,
            &self.creator.extract_boolean(formula2)?,
        )?)
    }

    /// If-then-else over two branches of the same type.
    pub fn if_then_else(
        &self,
        condition: &BoolOf<C>,
        then_formula: &FormulaOf<C>,
        else_formula: &FormulaOf<C>,
    ) -> Result<FormulaOf<C>> {
        let formula_type = then_formula.formula_type();
        if formula_type != else_formula.formula_type() {
            return Err(SolverError::type_mismatch(
                formula_type,
                else_formula.formula_type(),
            ));
        }
        let term = self.native().mk_ite(
            &self.creator.extract_boolean(condition)?,
            &self.creator.extract(then_formula)?,
            &self.creator.extract(else_formula)?,
        )?;
        self.creator.encapsulate(formula_type, term)
    }

    pub fn if_then_else_boolean(
        &self,
        condition: &BoolOf<C>,
        then_formula: &BoolOf<C>,
        else_formula: &BoolOf<C>,
    ) -> Result<BoolOf<C>> {
        BooleanFormula::try_from(self.if_then_else(
            condition,
            then_formula.as_formula(),
            else_formula.as_formula(),
        )?)
    }

    fn build(&self, connective: Connective, terms: &[C::Term]) -> Result<C::Term> {
        match connective {
            Connective::And => self.native().mk_and(terms),
            Connective::Or => self.native().mk_or(terms),
        }
    }

    fn binary(&self, outer: Connective, term1: C::Term, term2: C::Term) -> Result<BoolOf<C>> {
        match self.distribute(outer, &term1, &term2)? {
            Some(term) => self.wrap(term),
            None => self.wrap(self.build(outer, &[term1, term2])?),
        }
    }

    fn connective_of(&self, term: &C::Term) -> Result<Option<Connective>> {
        Ok(match self.kind(term)? {
            TermKind::And => Some(Connective::And),
            TermKind::Or => Some(Connective::Or),
            _ => None,
        })
    }

    /// Rewrites `(a . b) * (a . c)` into `a . (b * c)` when both operands are
    /// binary nodes of the same connective sharing one operand.
    fn distribute(
        &self,
        outer: Connective,
        term1: &C::Term,
        term2: &C::Term,
    ) -> Result<Option<C::Term>> {
        let inner = match (self.connective_of(term1)?, self.connective_of(term2)?) {
            (Some(left), Some(right)) if left == right => left,
            _ => return Ok(None),
        };
        let converter = self.creator.converter();
        let (left, right) = (converter.children(term1)?, converter.children(term2)?);
        let ([s11, s12], [s21, s22]) = (left.as_slice(), right.as_slice()) else {
            return Ok(None);
        };
        let pairings = [
            (s11, s21, s12, s22),
            (s11, s22, s12, s21),
            (s12, s21, s11, s22),
            (s12, s22, s11, s21),
        ];
        let mut matching = pairings.iter().filter(|(a, b, _, _)| a == b);
        // Exactly one shared operand, otherwise the rewrite would drop one.
        let (Some(&(shared, _, rest1, rest2)), None) = (matching.next(), matching.next()) else {
            return Ok(None);
        };
        let rest = self.build(outer, &[rest1.clone(), rest2.clone()])?;
        Ok(Some(self.build(inner, &[shared.clone(), rest])?))
    }

    fn nary(&self, connective: Connective, operands: &[BoolOf<C>]) -> Result<BoolOf<C>> {
        let (neutral, absorbing) = match connective {
            Connective::And => (TermKind::True, TermKind::False),
            Connective::Or => (TermKind::False, TermKind::True),
        };
        let mut seen = FxHashSet::default();
        let mut terms = Vec::with_capacity(operands.len());
        for operand in operands {
            let term = self.creator.extract_boolean(operand)?;
            let kind = self.kind(&term)?;
            if kind == absorbing {
                return Ok(operand.clone());
            }
            if kind != neutral && seen.insert(term.clone()) {
                terms.push(term);
            }
        }
        match terms.len() {
            0 => self.make_boolean(connective == Connective::And),
            1 => self.wrap(terms.remove(0)),
            2 => {
                let second = terms.remove(1);
                let first = terms.remove(0);
                self.binary(connective, first, second)
            }
            _ => self.wrap(self.build(connective, &terms)?),
        }
    }

    fn operands(&self, term: &C::Term) -> Result<Vec<BoolOf<C>>> {
        self.creator
            .converter()
            .children(term)?
            .into_iter()
            .map(|child| self.wrap(child))
            .collect()
    }

    fn is_boolean_term(&self, term: &C::Term) -> Result<bool> {
        Ok(self.creator.get_type(term)?.is_boolean())
    }

    /// Dispatches on the top-level connective of `formula`.
    pub fn visit<R, V>(&self, formula: &BoolOf<C>, visitor: &mut V) -> Result<R>
    where
        V: BooleanFormulaVisitor<C, R> + ?Sized,
    {
        let converter = self.creator.converter();
        let term = self.creator.extract_boolean(formula)?;
        let kind = self.kind(&term)?;
        let malformed = || {
            SolverError::InvalidArgument(format!(
                "malformed {:?} node {}",
                kind,
                converter.dump(&term).unwrap_or_default()
            ))
        };
        let unsupported = || {
            SolverError::UnsupportedOperator(
                converter
                    .symbol_name(&term)
                    .unwrap_or_else(|_| format!("{:?}", kind)),
            )
        };
        match kind {
            TermKind::True => visitor.visit_true(),
            TermKind::False => visitor.visit_false(),
            TermKind::Not => match self.operands(&term)?.as_slice() {
                [operand] => visitor.visit_not(operand),
                _ => Err(malformed()),
            },
            TermKind::And => visitor.visit_and(&self.operands(&term)?),
            TermKind::Or => visitor.visit_or(&self.operands(&term)?),
            TermKind::Iff => match self.operands(&term)?.as_slice() {
                [left, right] => visitor.visit_equivalence(left, right),
                _ => Err(malformed()),
            },
            TermKind::Eq | TermKind::Distinct => {
                let children = converter.children(&term)?;
                let over_booleans = match children.first() {
                    Some(first) => self.is_boolean_term(first)?,
                    None => return Err(malformed()),
                };
                if !over_booleans {
                    return visitor.visit_atom(formula);
                }
                match (kind, children.as_slice()) {
                    (TermKind::Eq, [left, right]) => visitor
                        .visit_equivalence(&self.wrap(left.clone())?, &self.wrap(right.clone())?),
                    _ => Err(unsupported()),
                }
            }
            TermKind::Implies => match self.operands(&term)?.as_slice() {
                [left, right] => visitor.visit_implication(left, right),
                _ => Err(malformed()),
            },
            TermKind::Ite => match self.operands(&term)?.as_slice() {
                [condition, then_branch, else_branch] => {
                    visitor.visit_if_then_else(condition, then_branch, else_branch)
                }
                _ => Err(malformed()),
            },
            TermKind::Quantifier(quantifier) => match self.operands(&term)?.as_slice() {
                [body] => visitor.visit_quantifier(formula, quantifier, body),
                _ => Err(malformed()),
            },
            TermKind::Xor | TermKind::Unknown => Err(unsupported()),
            TermKind::Value
            | TermKind::Variable
            | TermKind::BoundVariable(_)
            | TermKind::Uf
            | TermKind::Interpreted => visitor.visit_atom(formula),
        }
    }

    /// Visits every distinct boolean sub-formula once, parents before children.
    pub fn visit_recursively<V>(&self, formula: &BoolOf<C>, visitor: &mut V) -> Result<()>
    where
        V: BooleanFormulaVisitor<C, TraversalProcess> + ?Sized,
    {
        let mut seen = FxHashSet::default();
        let mut pending = vec![formula.clone()];
        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            match self.visit(&current, visitor)? {
                TraversalProcess::Abort => return Ok(()),
                TraversalProcess::Skip => {}
                TraversalProcess::Continue => {
                    let term = self.creator.extract_boolean(&current)?;
                    if self.has_boolean_operands(&term)? {
                        pending.extend(self.operands(&term)?.into_iter().rev());
                    }
                }
            }
        }
        Ok(())
    }

    fn has_boolean_operands(&self, term: &C::Term) -> Result<bool> {
        Ok(match self.kind(term)? {
            TermKind::Not
            | TermKind::And
            | TermKind::Or
            | TermKind::Iff
            | TermKind::Implies
            | TermKind::Ite
            | TermKind::Quantifier(_) => true,
            TermKind::Eq => match self.creator.converter().children(term)?.first() {
                Some(first) => self.is_boolean_term(first)?,
                None => false,
            },
            _ => false,
        })
    }

    pub fn transform_recursively<X>(&self, formula: &BoolOf<C>, transformation: &mut X) -> Result<BoolOf<C>>
    where
        X: BooleanFormulaTransformation<C>,
    {
        transformation.visit_if_not_seen(formula)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::DummyContext;
    use crate::options::Options;
    use proptest::prelude::*;

    fn manager() -> BooleanFormulaManager<DummyContext> {
        let context = Rc::new(DummyContext::new());
        let creator = FormulaCreator::new(context, &Options::default()).unwrap();
        BooleanFormulaManager::new(Rc::new(creator))
    }

    fn term(bmgr: &BooleanFormulaManager<DummyContext>, f: &BoolOf<DummyContext>) -> crate::dummy::DummyTerm {
        bmgr.creator().extract_boolean(f).unwrap()
    }

    #[test]
    fn neutral_elements_and_idempotence() {
        let bmgr = manager();
        let a = bmgr.make_variable("a").unwrap();
        let t = bmgr.make_true().unwrap();
        let f = bmgr.make_false().unwrap();
        assert_eq!(bmgr.and(&a, &a).unwrap(), a);
        assert_eq!(bmgr.or(&a, &a).unwrap(), a);
        assert_eq!(bmgr.and(&a, &t).unwrap(), a);
        assert_eq!(bmgr.and(&t, &a).unwrap(), a);
        assert_eq!(bmgr.or(&f, &a).unwrap(), a);
        assert_eq!(bmgr.or(&a, &f).unwrap(), a);
        assert!(bmgr.is_true(&t).unwrap());
        assert!(bmgr.is_false(&f).unwrap());
        assert!(!bmgr.is_true(&a).unwrap());
    }

    #[test]
    fn double_negation_is_removed() {
        let bmgr = manager();
        let a = bmgr.make_variable("a").unwrap();
        let not_a = bmgr.not(&a).unwrap();
        assert_ne!(not_a, a);
        assert_eq!(bmgr.not(&not_a).unwrap(), a);
    }

    #[test]
    fn shared_operand_is_factored_out() {
        let bmgr = manager();
        let converter = bmgr.creator().converter().clone();
        let a = bmgr.make_variable("a").unwrap();
        let b = bmgr.make_variable("b").unwrap();
        let c = bmgr.make_variable("c").unwrap();
        let ab = bmgr.or(&a, &b).unwrap();
        let ac = bmgr.or(&a, &c).unwrap();

        let result = bmgr.and(&ab, &ac).unwrap();
        let root = term(&bmgr, &result);
        assert_eq!(converter.term_kind(&root).unwrap(), TermKind::Or);
        let children = converter.children(&root).unwrap();
        assert_eq!(children[0], term(&bmgr, &a));
        assert_eq!(converter.term_kind(&children[1]).unwrap(), TermKind::And);
        assert_eq!(
            converter.children(&children[1]).unwrap(),
            vec![term(&bmgr, &b), term(&bmgr, &c)]
        );
    }

    #[test]
    fn every_pairing_is_checked() {
        let bmgr = manager();
        let converter = bmgr.creator().converter().clone();
        let a = bmgr.make_variable("a").unwrap();
        let b = bmgr.make_variable("b").unwrap();
        let c = bmgr.make_variable("c").unwrap();
        let pairs = [
            (bmgr.and(&a, &b).unwrap(), bmgr.and(&a, &c).unwrap()),
            (bmgr.and(&a, &b).unwrap(), bmgr.and(&c, &a).unwrap()),
            (bmgr.and(&b, &a).unwrap(), bmgr.and(&a, &c).unwrap()),
            (bmgr.and(&b, &a).unwrap(), bmgr.and(&c, &a).unwrap()),
        ];
        for (left, right) in &pairs {
            let result = bmgr.or(left, right).unwrap();
            let root = term(&bmgr, &result);
            assert_eq!(converter.term_kind(&root).unwrap(), TermKind::And);
            assert_eq!(converter.children(&root).unwrap()[0], term(&bmgr, &a));
        }

        // Mixed connectives are left alone.
        let mixed = bmgr
            .and(&bmgr.or(&a, &b).unwrap(), &bmgr.and(&a, &c).unwrap())
            .unwrap();
        let root = term(&bmgr, &mixed);
        assert_eq!(converter.children(&root).unwrap().len(), 2);
        assert_eq!(converter.term_kind(&root).unwrap(), TermKind::And);
        assert_ne!(converter.children(&root).unwrap()[0], term(&bmgr, &a));
    }

    #[test]
    fn operands_sharing_both_children_are_not_factored() {
        let bmgr = manager();
        let converter = bmgr.creator().converter().clone();
        let a = bmgr.make_variable("a").unwrap();
        let b = bmgr.make_variable("b").unwrap();
        let ab = bmgr.and(&a, &b).unwrap();
        let ba = bmgr.and(&b, &a).unwrap();
        assert_ne!(ab, ba);

        let result = bmgr.or(&ab, &ba).unwrap();
        let root = term(&bmgr, &result);
        assert_eq!(converter.term_kind(&root).unwrap(), TermKind::Or);
        assert_eq!(
            converter.children(&root).unwrap(),
            vec![term(&bmgr, &ab), term(&bmgr, &ba)]
        );
    }

    #[test]
    fn nary_operations_drop_neutral_operands() {
        let bmgr = manager();
        let a = bmgr.make_variable("a").unwrap();
        let b = bmgr.make_variable("b").unwrap();
        let t = bmgr.make_true().unwrap();
        let f = bmgr.make_false().unwrap();
        assert_eq!(bmgr.and_all(&[t.clone(), a.clone(), a.clone()]).unwrap(), a);
        assert!(bmgr.is_false(&bmgr.and_all(&[a.clone(), f.clone()]).unwrap()).unwrap());
        assert!(bmgr.is_true(&bmgr.or_all(&[a.clone(), t.clone()]).unwrap()).unwrap());
        assert!(bmgr.is_true(&bmgr.and_all(&[]).unwrap()).unwrap());
        assert!(bmgr.is_false(&bmgr.or_all(&[]).unwrap()).unwrap());
        assert_eq!(bmgr.or_all(&[f, a.clone(), b.clone()]).unwrap(), bmgr.or(&a, &b).unwrap());
    }

    #[test]
    fn xor_is_negated_equivalence() {
        let bmgr = manager();
        let a = bmgr.make_variable("a").unwrap();
        let b = bmgr.make_variable("b").unwrap();
        let x = bmgr.xor(&a, &b).unwrap();
        assert_eq!(bmgr.not(&x).unwrap(), bmgr.equivalence(&a, &b).unwrap());
    }

    #[test]
    fn if_then_else_requires_matching_branches() {
        let bmgr = manager();
        let creator = bmgr.creator().clone();
        let c = bmgr.make_variable("c").unwrap();
        let x = creator
            .encapsulate_with_type_of(creator.make_variable(&FormulaType::Integer, "x").unwrap())
            .unwrap();
        let y = creator
            .encapsulate_with_type_of(creator.make_variable(&FormulaType::Integer, "y").unwrap())
            .unwrap();
        let p = bmgr.make_variable("p").unwrap();

        let ite = bmgr.if_then_else(&c, &x, &y).unwrap();
        assert_eq!(ite.formula_type(), &FormulaType::Integer);
        assert!(matches!(
            bmgr.if_then_else(&c, &x, p.as_formula()),
            Err(SolverError::TypeMismatch { .. })
        ));
        let q = bmgr.make_variable("q").unwrap();
        assert!(bmgr.if_then_else_boolean(&c, &p, &q).is_ok());
    }

    #[derive(Debug, Clone)]
    enum Shape {
        Leaf(usize),
        Not(Box<Shape>),
        And(Box<Shape>, Box<Shape>),
        Or(Box<Shape>, Box<Shape>),
    }

    fn shape() -> impl Strategy<Value = Shape> {
        let leaf = (0..4usize).prop_map(Shape::Leaf);
        leaf.prop_recursive(4, 24, 2, |inner| {
            prop_oneof![
                inner.clone().prop_map(|s| Shape::Not(Box::new(s))),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| Shape::And(Box::new(l), Box::new(r))),
                (inner.clone(), inner).prop_map(|(l, r)| Shape::Or(Box::new(l), Box::new(r))),
            ]
        })
    }

    fn build(bmgr: &BooleanFormulaManager<DummyContext>, shape: &Shape) -> BoolOf<DummyContext> {
        match shape {
            Shape::Leaf(i) => bmgr.make_variable(&format!("v{}", i)).unwrap(),
            Shape::Not(s) => bmgr.not(&build(bmgr, s)).unwrap(),
            Shape::And(l, r) => bmgr.and(&build(bmgr, l), &build(bmgr, r)).unwrap(),
            Shape::Or(l, r) => bmgr.or(&build(bmgr, l), &build(bmgr, r)).unwrap(),
        }
    }

    proptest! {
        #[test]
        fn double_negation_holds_for_any_formula(s in shape()) {
            let bmgr = manager();
            let f = build(&bmgr, &s);
            prop_assert_eq!(bmgr.not(&bmgr.not(&f).unwrap()).unwrap(), f);
        }

        #[test]
        fn idempotence_and_identities_hold(s in shape()) {
            let bmgr = manager();
            let f = build(&bmgr, &s);
            let t = bmgr.make_true().unwrap();
            let ff = bmgr.make_false().unwrap();
            prop_assert_eq!(bmgr.and(&f, &f).unwrap(), f.clone());
            prop_assert_eq!(bmgr.or(&f, &f).unwrap(), f.clone());
            prop_assert_eq!(bmgr.and(&f, &t).unwrap(), f.clone());
            prop_assert_eq!(bmgr.or(&f, &ff).unwrap(), f);
        }
    }
}
