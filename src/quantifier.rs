use std::rc::Rc;

use crate::creator::{BoolOf, FormulaCreator, FormulaOf};
use crate::error::{Result, SolverError};
use crate::generalized::{GeneralConverter, GeneralQuantifierConverter, Quantifier, TermKind};

pub struct QuantifiedFormulaManager<C: GeneralConverter> {
    creator: Rc<FormulaCreator<C>>,
}

impl<C: GeneralConverter> Clone for QuantifiedFormulaManager<C> {
    fn clone(&self) -> Self {
        Self {
            creator: self.creator.clone(),
        }
    }
}

impl<C: GeneralConverter> QuantifiedFormulaManager<C> {
    pub fn new(creator: Rc<FormulaCreator<C>>) -> Self {
        Self { creator }
    }

    fn native(&self) -> Result<&dyn GeneralQuantifierConverter<C::Sort, C::Term>> {
        self.creator
            .converter()
            .try_get_quantifier_converter()
            .ok_or_else(|| SolverError::UnsupportedTheory("quantifiers".to_string()))
    }

    pub fn forall(&self, variables: &[FormulaOf<C>], body: &BoolOf<C>) -> Result<BoolOf<C>> {
        self.mk_quantifier(Quantifier::Forall, variables, body)
    }

    pub fn exists(&self, variables: &[FormulaOf<C>], body: &BoolOf<C>) -> Result<BoolOf<C>> {
        self.mk_quantifier(Quantifier::Exists, variables, body)
    }

    /// Binds the free variables `variables` in `body`.
    pub fn mk_quantifier(
        &self,
        quantifier: Quantifier,
        variables: &[FormulaOf<C>],
        body: &BoolOf<C>,
    ) -> Result<BoolOf<C>> {
        let converter = self.creator.converter();
        let mut bound = Vec::with_capacity(variables.len());
        for variable in variables {
            let term = self.creator.extract(variable)?;
            if converter.term_kind(&term)? != TermKind::Variable {
                return Err(SolverError::InvalidArgument(format!(
                    "cannot quantify over {}",
                    converter.dump(&term)?
                )));
            }
            bound.push(term);
        }
        let body = self.creator.extract_boolean(body)?;
        self.creator
            .encapsulate_boolean(self.native()?.mk_quantifier(quantifier, &bound, &body)?)
    }

    pub fn is_quantifier(&self, formula: &BoolOf<C>) -> Result<bool> {
        let term = self.creator.extract_boolean(formula)?;
        Ok(matches!(
            self.creator.converter().term_kind(&term)?,
            TermKind::Quantifier(_)
        ))
    }

    pub fn get_quantifier_body(&self, formula: &BoolOf<C>) -> Result<BoolOf<C>> {
        let term = self.creator.extract_boolean(formula)?;
        let converter = self.creator.converter();
        match (converter.term_kind(&term)?, converter.children(&term)?.as_slice()) {
            (TermKind::Quantifier(_), [body]) => self.creator.encapsulate_boolean(body.clone()),
            _ => Err(SolverError::InvalidArgument(format!(
                "{} is not a quantifier",
                converter.dump(&term)?
            ))),
        }
    }

    pub fn is_bound_variable(&self, formula: &FormulaOf<C>) -> Result<bool> {
        let term = self.creator.extract(formula)?;
        Ok(matches!(
            self.creator.converter().term_kind(&term)?,
            TermKind::BoundVariable(_)
        ))
    }

    /// An equivalent quantifier-free formula, where the backend can find one.
    pub fn eliminate_quantifiers(&self, formula: &BoolOf<C>) -> Result<BoolOf<C>> {
        let term = self.creator.extract_boolean(formula)?;
        self.creator
            .encapsulate_boolean(self.native()?.eliminate_quantifiers(&term)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::BooleanFormulaManager;
    use crate::dummy::DummyContext;
    use crate::numeral::NumeralFormulaManager;
    use crate::options::Options;

    #[test]
    fn quantifier_round_trip() {
        let context = Rc::new(DummyContext::new());
        let creator = Rc::new(FormulaCreator::new(context, &Options::default()).unwrap());
        let qmgr = QuantifiedFormulaManager::new(creator.clone());
        let imgr = NumeralFormulaManager::integer(creator.clone()).unwrap();
        let bmgr = BooleanFormulaManager::new(creator);

        let x = imgr.make_variable("x").unwrap();
        let zero = imgr.make_number_from_str("0").unwrap();
        let body = imgr.greater_or_equals(&x, &zero).unwrap();
        let q = qmgr.forall(&[x.clone()], &body).unwrap();
        assert!(qmgr.is_quantifier(&q).unwrap());
        assert!(!qmgr.is_quantifier(&body).unwrap());

        let inner = qmgr.get_quantifier_body(&q).unwrap();
        assert_ne!(inner, body);
        assert!(qmgr.get_quantifier_body(&body).is_err());
        assert!(matches!(
            qmgr.exists(&[zero], &body),
            Err(SolverError::InvalidArgument(_))
        ));
        assert!(matches!(
            qmgr.eliminate_quantifiers(&q),
            Err(SolverError::UnsupportedOperator(_))
        ));
        assert!(!bmgr.is_true(&q).unwrap());
    }
}
