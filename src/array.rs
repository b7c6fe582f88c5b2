use std::rc::Rc;

use crate::creator::{BoolOf, FormulaCreator, FormulaOf};
use crate::error::{Result, SolverError};
use crate::generalized::{GeneralArrayConverter, GeneralConverter};
use crate::term::FormulaType;

pub struct ArrayFormulaManager<C: GeneralConverter> {
    creator: Rc<FormulaCreator<C>>,
}

impl<C: GeneralConverter> Clone for ArrayFormulaManager<C> {
    fn clone(&self) -> Self {
        Self {
            creator: self.creator.clone(),
        }
    }
}

impl<C: GeneralConverter> ArrayFormulaManager<C> {
    pub fn new(creator: Rc<FormulaCreator<C>>) -> Self {
        Self { creator }
    }

    fn native(&self) -> Result<&dyn GeneralArrayConverter<C::Sort, C::Term>> {
        self.creator
            .converter()
            .try_get_array_converter()
            .ok_or_else(|| SolverError::UnsupportedTheory("arrays".to_string()))
    }

    fn array_types<'a>(&self, array: &'a FormulaOf<C>) -> Result<(&'a FormulaType, &'a FormulaType)> {
        array.formula_type().try_get_array_types().ok_or_else(|| {
            SolverError::type_mismatch(
                &FormulaType::array(FormulaType::Integer, FormulaType::Integer),
                array.formula_type(),
            )
        })
    }

    fn checked(&self, expected: &FormulaType, formula: &FormulaOf<C>) -> Result<C::Term> {
        if expected != formula.formula_type() {
            return Err(SolverError::type_mismatch(expected, formula.formula_type()));
        }
        self.creator.extract(formula)
    }

    pub fn make_array(
        &self,
        name: &str,
        index_type: &FormulaType,
        element_type: &FormulaType,
    ) -> Result<FormulaOf<C>> {
        let formula_type = FormulaType::array(index_type.clone(), element_type.clone());
        let term = self.creator.make_variable(&formula_type, name)?;
        self.creator.encapsulate(&formula_type, term)
    }

    /// The array that maps every index to `value`.
    pub fn make_const_array(&self, index_type: &FormulaType, value: &FormulaOf<C>) -> Result<FormulaOf<C>> {
        let index_sort = self.creator.sort_of(index_type)?;
        let term = self
            .native()?
            .mk_const_array(&index_sort, &self.creator.extract(value)?)?;
        let formula_type = FormulaType::array(index_type.clone(), value.formula_type().clone());
        self.creator.encapsulate(&formula_type, term)
    }

    pub fn select(&self, array: &FormulaOf<C>, index: &FormulaOf<C>) -> Result<FormulaOf<C>> {
        let (index_type, element_type) = self.array_types(array)?;
        let term = self.native()?.mk_select(
            &self.creator.extract(array)?,
            &self.checked(index_type, index)?,
        )?;
        self.creator.encapsulate(element_type, term)
    }

    pub fn store(
        &self,
        array: &FormulaOf<C>,
        index: &FormulaOf<C>,
        value: &FormulaOf<C>,
    ) -> Result<FormulaOf<C>> {
        let (index_type, element_type) = self.array_types(array)?;
        let term = self.native()?.mk_store(
            &self.creator.extract(array)?,
            &self.checked(index_type, index)?,
            &self.checked(element_type, value)?,
        )?;
        self.creator.encapsulate(array.formula_type(), term)
    }

    pub fn equivalence(&self, array1: &FormulaOf<C>, array2: &FormulaOf<C>) -> Result<BoolOf<C>> {
        self.array_types(array1)?;
        let term = self.creator.converter().bool_converter().mk_eq(
            &self.creator.extract(array1)?,
            &self.checked(array1.formula_type(), array2)?,
        )?;
        self.creator.encapsulate_boolean(term)
    }
}
