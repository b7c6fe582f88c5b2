use num_bigint::BigInt;
use num_rational::BigRational;
use std::rc::Rc;
use std::str::FromStr;

use crate::creator::{BoolOf, FormulaCreator, FormulaOf};
use crate::error::{Result, SolverError};
use crate::generalized::{GeneralConverter, GeneralNumeralConverter};
use crate::term::FormulaType;

/// Integer or rational arithmetic. Both share this implementation; a rational
/// manager accepts integer operands and widens them with `to_real`.
pub struct NumeralFormulaManager<C: GeneralConverter> {
    creator: Rc<FormulaCreator<C>>,
    formula_type: FormulaType,
}

impl<C: GeneralConverter> Clone for NumeralFormulaManager<C> {
    fn clone(&self) -> Self {
        Self {
            creator: self.creator.clone(),
            formula_type: self.formula_type.clone(),
        }
    }
}

impl<C: GeneralConverter> NumeralFormulaManager<C> {
    pub fn integer(creator: Rc<FormulaCreator<C>>) -> Result<Self> {
        creator.int_sort()?;
        Ok(Self {
            creator,
            formula_type: FormulaType::Integer,
        })
    }

    pub fn rational(creator: Rc<FormulaCreator<C>>) -> Result<Self> {
        creator.rational_sort()?;
        Ok(Self {
            creator,
            formula_type: FormulaType::Rational,
        })
    }

    pub fn formula_type(&self) -> &FormulaType {
        &self.formula_type
    }

    fn native(&self) -> Result<&dyn GeneralNumeralConverter<C::Sort, C::Term>> {
        self.creator
            .converter()
            .try_get_numeral_converter()
            .ok_or_else(|| SolverError::UnsupportedTheory("arithmetic".to_string()))
    }

    fn operand(&self, formula: &FormulaOf<C>) -> Result<C::Term> {
        if !self.formula_type.accepts(formula.formula_type()) {
            return Err(SolverError::type_mismatch(
                &self.formula_type,
                formula.formula_type(),
            ));
        }
        let term = self.creator.extract(formula)?;
        if self.formula_type == FormulaType::Rational
            && self.creator.get_type(&term)? == FormulaType::Integer
        {
            return self.native()?.mk_to_real(&term);
        }
        Ok(term)
    }

    fn operands(&self, formulas: &[FormulaOf<C>]) -> Result<Vec<C::Term>> {
        formulas.iter().map(|f| self.operand(f)).collect()
    }

    fn wrap(&self, term: C::Term) -> Result<FormulaOf<C>> {
        self.creator.encapsulate(&self.formula_type, term)
    }

    fn wrap_bool(&self, term: C::Term) -> Result<BoolOf<C>> {
        self.creator.encapsulate_boolean(term)
    }

    pub fn make_number(&self, value: &BigRational) -> Result<FormulaOf<C>> {
        if self.formula_type == FormulaType::Integer && !value.is_integer() {
            return Err(SolverError::InvalidArgument(format!(
                "{} is not an integer",
                value
            )));
        }
        let sort = self.creator.sort_of(&self.formula_type)?;
        self.wrap(self.native()?.mk_numeral(value, &sort)?)
    }

    pub fn make_integer(&self, value: &BigInt) -> Result<FormulaOf<C>> {
        self.make_number(&BigRational::from_integer(value.clone()))
    }

    /// Accepts integers, fractions such as `1/3` and decimals such as `-2.25`.
    pub fn make_number_from_str(&self, text: &str) -> Result<FormulaOf<C>> {
        self.make_number(&parse_number(text)?)
    }

    pub fn make_variable(&self, name: &str) -> Result<FormulaOf<C>> {
        self.wrap(self.creator.make_variable(&self.formula_type, name)?)
    }

    pub fn negate(&self, formula: &FormulaOf<C>) -> Result<FormulaOf<C>> {
        self.wrap(self.native()?.mk_neg(&self.operand(formula)?)?)
    }

    pub fn add(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>) -> Result<FormulaOf<C>> {
        self.sum(&[formula1.clone(), formula2.clone()])
    }

    pub fn sum(&self, operands: &[FormulaOf<C>]) -> Result<FormulaOf<C>> {
        match operands {
            [] => self.make_number(&BigRational::from_integer(BigInt::from(0))),
            [single] => self.wrap(self.operand(single)?),
            _ => self.wrap(self.native()?.mk_add(&self.operands(operands)?)?),
        }
    }

    pub fn subtract(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>) -> Result<FormulaOf<C>> {
        self.wrap(
            self.native()?
                .mk_sub(&self.operand(formula1)?, &self.operand(formula2)?)?,
        )
    }

    pub fn multiply(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>) -> Result<FormulaOf<C>> {
        self.wrap(
            self.native()?
                .mk_mul(&self.operand(formula1)?, &self.operand(formula2)?)?,
        )
    }

    /// Integer division for the integer manager, real division otherwise.
    pub fn divide(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>) -> Result<FormulaOf<C>> {
        self.wrap(
            self.native()?
                .mk_div(&self.operand(formula1)?, &self.operand(formula2)?)?,
        )
    }

    pub fn modulo(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>) -> Result<FormulaOf<C>> {
        if self.formula_type != FormulaType::Integer {
            return Err(SolverError::UnsupportedOperator(
                "modulo over rationals".to_string(),
            ));
        }
        self.wrap(
            self.native()?
                .mk_mod(&self.operand(formula1)?, &self.operand(formula2)?)?,
        )
    }

    pub fn equal(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>) -> Result<BoolOf<C>> {
        let bools = self.creator.converter().bool_converter();
        self.wrap_bool(bools.mk_eq(&self.operand(formula1)?, &self.operand(formula2)?)?)
    }

    pub fn distinct(&self, operands: &[FormulaOf<C>]) -> Result<BoolOf<C>> {
        if operands.len() < 2 {
            return self.wrap_bool(self.creator.converter().bool_converter().mk_smt_bool(true)?);
        }
        let bools = self.creator.converter().bool_converter();
        self.wrap_bool(bools.mk_distinct(&self.operands(operands)?)?)
    }

    pub fn greater_than(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>) -> Result<BoolOf<C>> {
        self.wrap_bool(
            self.native()?
                .mk_gt(&self.operand(formula1)?, &self.operand(formula2)?)?,
        )
    }

    pub fn greater_or_equals(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>) -> Result<BoolOf<C>> {
        self.wrap_bool(
            self.native()?
                .mk_ge(&self.operand(formula1)?, &self.operand(formula2)?)?,
        )
    }

    pub fn less_than(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>) -> Result<BoolOf<C>> {
        self.wrap_bool(
            self.native()?
                .mk_lt(&self.operand(formula1)?, &self.operand(formula2)?)?,
        )
    }

    pub fn less_or_equals(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>) -> Result<BoolOf<C>> {
        self.wrap_bool(
            self.native()?
                .mk_le(&self.operand(formula1)?, &self.operand(formula2)?)?,
        )
    }
}

fn parse_number(text: &str) -> Result<BigRational> {
    let invalid = || SolverError::InvalidArgument(format!("'{}' is not a number", text));
    let text = text.trim();
    if text.contains('/') {
        return BigRational::from_str(text).map_err(|_| invalid());
    }
    match text.split_once('.') {
        Some((whole, fraction)) => {
            let negative = whole.starts_with('-');
            let digits = format!("{}{}", whole.trim_start_matches('-'), fraction);
            let numer = BigInt::from_str(&digits).map_err(|_| invalid())?;
            let denom = BigInt::from(10).pow(fraction.len() as u32);
            let value = BigRational::new(numer, denom);
            Ok(if negative { -value } else { value })
        }
        None => BigInt::from_str(text)
            .map(BigRational::from_integer)
            .map_err(|_| invalid()),
    }
}
