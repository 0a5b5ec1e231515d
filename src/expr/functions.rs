use std::collections::{BTreeMap, HashMap};

use crate::{
    error::ExpressionError,
    expr::{
        lower::Builtin,
        parser::{Ast, Definition, parse_definition},
    },
};

/// User-defined functions written in the expression language.
///
/// The source holds one definition per line, `name(p1, p2) = body`. Lines starting
/// with `#` are comments. Calls are expanded by substituting arguments for parameters
/// before the expression is lowered.
#[derive(Debug, Clone, Default)]
pub struct UserFunctions {
    defs: BTreeMap<String, Definition>,
}

impl UserFunctions {
    pub fn parse(source: Option<&str>) -> Result<Self, ExpressionError> {
        let mut defs = BTreeMap::new();
        let Some(source) = source else {
            return Ok(Self { defs });
        };

        for line in source.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let def = parse_definition(line)?;
            if def.name.parse::<Builtin>().is_ok() || defs.contains_key(&def.name) {
                return Err(ExpressionError::DuplicateFunction(def.name));
            }
            defs.insert(def.name.clone(), def);
        }
        Ok(Self { defs })
    }

    /// Inlines every user function call in `ast`.
    pub fn expand(&self, ast: &Ast) -> Result<Ast, ExpressionError> {
        if self.defs.is_empty() {
            return Ok(ast.clone());
        }
        self.expand_with(ast, &mut Vec::new())
    }

    fn expand_with(&self, ast: &Ast, stack: &mut Vec<String>) -> Result<Ast, ExpressionError> {
        match ast {
            Ast::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|a| self.expand_with(a, stack))
                    .collect::<Result<Vec<_>, _>>()?;

                let Some(def) = self.defs.get(name) else {
                    return Ok(Ast::Call {
                        name: name.clone(),
                        args,
                    });
                };
                if stack.contains(name) {
                    return Err(ExpressionError::Recursion(name.clone()));
                }
                if def.params.len() != args.len() {
                    return Err(ExpressionError::Arity {
                        name: name.clone(),
                        expected: def.params.len(),
                        found: args.len(),
                    });
                }

                let bindings = def
                    .params
                    .iter()
                    .map(String::as_str)
                    .zip(args.iter())
                    .collect::<HashMap<_, _>>();
                let body = substitute(&def.body, &bindings);

                stack.push(name.clone());
                let expanded = self.expand_with(&body, stack);
                stack.pop();
                expanded
            }
            Ast::Unary { op, operand } => Ok(Ast::Unary {
                op: *op,
                operand: Box::new(self.expand_with(operand, stack)?),
            }),
            Ast::Binary { op, lhs, rhs } => Ok(Ast::Binary {
                op: *op,
                lhs: Box::new(self.expand_with(lhs, stack)?),
                rhs: Box::new(self.expand_with(rhs, stack)?),
            }),
            Ast::Number(_) | Ast::Bool(_) | Ast::Var(_) => Ok(ast.clone()),
        }
    }
}

fn substitute(ast: &Ast, bindings: &HashMap<&str, &Ast>) -> Ast {
    match ast {
        Ast::Var(name) => bindings
            .get(name.as_str())
            .map(|arg| (*arg).clone())
            .unwrap_or_else(|| ast.clone()),
        Ast::Unary { op, operand } => Ast::Unary {
            op: *op,
            operand: Box::new(substitute(operand, bindings)),
        },
        Ast::Binary { op, lhs, rhs } => Ast::Binary {
            op: *op,
            lhs: Box::new(substitute(lhs, bindings)),
            rhs: Box::new(substitute(rhs, bindings)),
        },
        Ast::Call { name, args } => Ast::Call {
            name: name.clone(),
            args: args.iter().map(|a| substitute(a, bindings)).collect(),
        },
        Ast::Number(_) | Ast::Bool(_) => ast.clone(),
    }
}
