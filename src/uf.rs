use std::rc::Rc;

use crate::creator::{DeclarationOf, FormulaCreator, FormulaOf};
use crate::error::{Result, SolverError};
use crate::generalized::GeneralConverter;
use crate::term::FormulaType;

pub struct UfManager<C: GeneralConverter> {
    creator: Rc<FormulaCreator<C>>,
}

impl<C: GeneralConverter> Clone for UfManager<C> {
    fn clone(&self) -> Self {
        Self {
            creator: self.creator.clone(),
        }
    }
}

impl<C: GeneralConverter> UfManager<C> {
    pub fn new(creator: Rc<FormulaCreator<C>>) -> Self {
        Self { creator }
    }

    /// Declares `name` once per signature; later calls return an equal declaration.
    pub fn declare_uf(
        &self,
        name: &str,
        return_type: &FormulaType,
        argument_types: &[FormulaType],
    ) -> Result<DeclarationOf<C>> {
        self.creator
            .declare_function(name, argument_types, return_type)
    }

    pub fn call_uf(&self, declaration: &DeclarationOf<C>, args: &[FormulaOf<C>]) -> Result<FormulaOf<C>> {
        if declaration.owner() != self.creator.env_id() {
            return Err(SolverError::ForeignValue);
        }
        let expected = declaration.argument_types();
        if expected.len() != args.len() {
            return Err(SolverError::InvalidArgument(format!(
                "{} expects {} arguments, got {}",
                declaration.name(),
                expected.len(),
                args.len()
            )));
        }
        let mut terms = Vec::with_capacity(args.len());
        for (arg, expected_type) in args.iter().zip(expected) {
            if !expected_type.accepts(arg.formula_type()) {
                return Err(SolverError::type_mismatch(expected_type, arg.formula_type()));
            }
            terms.push(self.argument(arg, expected_type)?);
        }
        let term = self
            .creator
            .converter()
            .mk_app(declaration.decl(), &terms)?;
        self.creator.encapsulate(declaration.return_type(), term)
    }

    pub fn declare_and_call_uf(
        &self,
        name: &str,
        return_type: &FormulaType,
        args: &[FormulaOf<C>],
    ) -> Result<FormulaOf<C>> {
        let argument_types: Vec<FormulaType> =
            args.iter().map(|arg| arg.formula_type().clone()).collect();
        let declaration = self.declare_uf(name, return_type, &argument_types)?;
        self.call_uf(&declaration, args)
    }

    fn argument(&self, arg: &FormulaOf<C>, expected_type: &FormulaType) -> Result<C::Term> {
        let term = self.creator.extract(arg)?;
        if *expected_type == FormulaType::Rational
            && self.creator.get_type(&term)? == FormulaType::Integer
        {
            let numeral = self
                .creator
                .converter()
                .try_get_numeral_converter()
                .ok_or_else(|| SolverError::UnsupportedTheory("arithmetic".to_string()))?;
            return numeral.mk_to_real(&term);
        }
        Ok(term)
    }
}
