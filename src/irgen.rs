//! Generación de código intermedio.
//!
//! Recorre el árbol ya anotado por [`crate::semantic`] y lo aplana en
//! una secuencia de instrucciones de [`crate::ir`] para la función
//! implícita `main`. El control de flujo estructurado (condicionales,
//! operadores lógicos de cortocircuito, ciclos con `break`/`continue`)
//! se reduce a etiquetas y saltos.

use std::{collections::HashSet, mem};

use thiserror::Error;

use crate::{
    ir::{Instruction, Label, Program, Var},
    lex::Identifier,
    parse::{BinOp, Expr, ExprKind, Literal},
    semantic::{Signatures, Type},
    source::{Located, Location},
    symtab::SymbolTable,
};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum IrError {
    #[error("`{0}` used outside of a loop")]
    OutsideLoop(Identifier),

    #[error("Left-hand side of `=` must be a variable")]
    BadAssignment,

    #[error("Symbol `{0}` is undefined")]
    Undefined(Identifier),

    #[error("Expression was not type-checked")]
    Untyped,
}

type Generate<T> = Result<T, Located<IrError>>;

/// Genera el cuerpo de `main` a partir de un árbol anotado.
///
/// El resultado del programa se imprime al final con `print_int` o
/// `print_bool`, según su tipo. Un resultado `Unit` no se imprime.
#[tracing::instrument(level = "debug", skip_all)]
pub fn generate(signatures: &Signatures, root: &Expr) -> Generate<Vec<Instruction>> {
    let scope = signatures
        .iter()
        .map(|(name, signature)| (name.clone(), Var::new(name.as_ref(), signature.returns)))
        .collect();

    let mut generator = Generator {
        scope,
        instructions: Vec::new(),
        next_var: 1,
        next_label: 1,
        unit: Var::new("unit", Type::Unit),
        loop_labels: None,
        storage: HashSet::new(),
    };

    let result = generator.visit(root)?;
    let printer = match result.typ() {
        Type::Int => Some("print_int"),
        Type::Bool => Some("print_bool"),
        Type::Unit => None,
    };

    if let Some(printer) = printer {
        let target = generator.resolve(printer, &root.location)?;
        let output = generator.unit.clone();

        generator.push(Instruction::Call {
            target,
            arguments: vec![result],
            output,
        });
    }

    tracing::debug!(
        instructions = generator.instructions.len(),
        vars = generator.next_var - 1,
        labels = generator.next_label - 1,
        "IR generation complete"
    );

    Ok(generator.instructions)
}

/// Como [`generate()`], envolviendo el resultado en un programa.
pub fn generate_program(signatures: &Signatures, root: &Expr) -> Generate<Program> {
    generate(signatures, root).map(Program::main)
}

/// Destinos de salto del ciclo más interno.
struct LoopLabels {
    test: Label,
    end: Label,
}

struct Generator {
    scope: SymbolTable<Var>,
    instructions: Vec<Instruction>,
    next_var: u32,
    next_label: u32,
    unit: Var,
    loop_labels: Option<LoopLabels>,
    /// Variables declaradas con `var`, cuyo valor puede cambiar por asignación.
    storage: HashSet<Var>,
}

impl Generator {
    fn visit(&mut self, expr: &Expr) -> Generate<Var> {
        let location = &expr.location;
        let typ = expr
            .typ
            .ok_or_else(|| Located::at(IrError::Untyped, location.clone()))?;

        match &expr.kind {
            ExprKind::Literal(Literal::Int(value)) => {
                let output = self.fresh_var(Type::Int);
                self.push(Instruction::LoadIntConst(*value, output.clone()));
                Ok(output)
            }

            ExprKind::Literal(Literal::Bool(value)) => {
                let output = self.fresh_var(Type::Bool);
                self.push(Instruction::LoadBoolConst(*value, output.clone()));
                Ok(output)
            }

            ExprKind::Literal(Literal::Unit) => Ok(self.unit.clone()),

            ExprKind::Identifier(id) => match id.as_ref() {
                "break" | "continue" => {
                    let labels = match &self.loop_labels {
                        Some(labels) => labels,
                        None => return fail(IrError::OutsideLoop(id.clone()), location),
                    };

                    let target = if id.as_ref() == "break" {
                        labels.end.clone()
                    } else {
                        labels.test.clone()
                    };

                    self.push(Instruction::Jump(target));
                    Ok(self.unit.clone())
                }

                name => self.resolve(name, location),
            },

            ExprKind::Binary(left, BinOp::Assign, right) => {
                let name = match &left.kind {
                    ExprKind::Identifier(id) if !matches!(id.as_ref(), "break" | "continue") => id,
                    _ => return fail(IrError::BadAssignment, location),
                };

                let value = self.visit(right)?;
                let target = self.resolve(name.as_ref(), &left.location)?;
                self.copy(value.clone(), target);

                Ok(value)
            }

            ExprKind::Binary(left, op @ (BinOp::And | BinOp::Or), right) => {
                self.short_circuit(*op, left, right)
            }

            ExprKind::Binary(left, op, right) => {
                let operands = self.operands(&[&**left, &**right])?;
                self.call(op.symbol(), operands, typ, location)
            }

            ExprKind::Unary(op, operand) => {
                let operand = self.visit(operand)?;
                self.call(op.symbol(), vec![operand], typ, location)
            }

            ExprKind::Call { callee, arguments } => {
                let target = self.resolve(callee.as_ref(), location)?;
                let arguments: Vec<_> = arguments.iter().collect();
                let arguments = self.operands(&arguments)?;

                let output = self.fresh_var(typ);
                self.push(Instruction::Call {
                    target,
                    arguments,
                    output: output.clone(),
                });

                Ok(output)
            }

            ExprKind::Condition {
                condition,
                then,
                otherwise: None,
            } => {
                let then_label = self.fresh_label("then");
                let end_label = self.fresh_label("if_end");

                let condition = self.visit(condition)?;
                self.push(Instruction::CondJump(
                    condition,
                    then_label.clone(),
                    end_label.clone(),
                ));

                self.push(Instruction::SetLabel(then_label));
                self.visit(then)?;
                self.push(Instruction::SetLabel(end_label));

                Ok(self.unit.clone())
            }

            ExprKind::Condition {
                condition,
                then,
                otherwise: Some(otherwise),
            } => {
                let then_label = self.fresh_label("then");
                let else_label = self.fresh_label("else");
                let end_label = self.fresh_label("if_end");

                let condition = self.visit(condition)?;
                self.push(Instruction::CondJump(
                    condition,
                    then_label.clone(),
                    else_label.clone(),
                ));

                let output = self.fresh_var(typ);

                self.push(Instruction::SetLabel(then_label));
                let then = self.visit(then)?;
                self.copy(then, output.clone());
                self.push(Instruction::Jump(end_label.clone()));

                self.push(Instruction::SetLabel(else_label));
                let otherwise = self.visit(otherwise)?;
                self.copy(otherwise, output.clone());
                self.push(Instruction::Jump(end_label.clone()));

                self.push(Instruction::SetLabel(end_label));
                Ok(output)
            }

            ExprKind::Block { statements, result } => {
                self.scope.enter();
                let output = self.block(statements, result);
                self.scope.leave();

                output
            }

            ExprKind::Declaration { name, value, .. } => {
                let value = self.visit(value)?;
                let var = self.fresh_var(value.typ());
                if var.typ() != Type::Unit {
                    self.storage.insert(var.clone());
                }

                self.scope.declare(name.clone(), var.clone());
                self.copy(value, var);

                Ok(self.unit.clone())
            }

            ExprKind::Loop { condition, body } => {
                let test = self.fresh_label("while_start");
                let body_label = self.fresh_label("while_body");
                let end = self.fresh_label("while_end");

                self.push(Instruction::SetLabel(test.clone()));
                let condition = self.visit(condition)?;
                self.push(Instruction::CondJump(
                    condition,
                    body_label.clone(),
                    end.clone(),
                ));

                self.push(Instruction::SetLabel(body_label));

                let labels = LoopLabels {
                    test: test.clone(),
                    end: end.clone(),
                };

                let outer = mem::replace(&mut self.loop_labels, Some(labels));
                let body = self.visit(body);
                self.loop_labels = outer;
                body?;

                self.push(Instruction::Jump(test));
                self.push(Instruction::SetLabel(end));

                Ok(self.unit.clone())
            }
        }
    }

    fn block(&mut self, statements: &[Expr], result: &Expr) -> Generate<Var> {
        for statement in statements {
            self.visit(statement)?;
        }

        self.visit(result)
    }

    /// Evalúa operandos de izquierda a derecha.
    ///
    /// Un operando que resulta en una variable declarada se copia a un
    /// temporal si le siguen otros operandos, ya que estos podrían
    /// reasignarla antes de la llamada.
    fn operands(&mut self, exprs: &[&Expr]) -> Generate<Vec<Var>> {
        let mut vars = Vec::with_capacity(exprs.len());
        for (index, expr) in exprs.iter().enumerate() {
            let var = self.visit(expr)?;
            let var = if index + 1 < exprs.len() && self.storage.contains(&var) {
                let snapshot = self.fresh_var(var.typ());
                self.copy(var, snapshot.clone());
                snapshot
            } else {
                var
            };

            vars.push(var);
        }

        Ok(vars)
    }

    fn short_circuit(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Generate<Var> {
        let (right_hint, skip_hint, end_hint) = match op {
            BinOp::And => ("and_right", "and_skip", "and_end"),
            _ => ("or_right", "or_skip", "or_end"),
        };

        let right_label = self.fresh_label(right_hint);
        let skip_label = self.fresh_label(skip_hint);
        let end_label = self.fresh_label(end_hint);

        // `and` se salta el operando derecho si el izquierdo es falso, `or` si es verdadero
        let left = self.visit(left)?;
        let jump = match op {
            BinOp::And => Instruction::CondJump(left, right_label.clone(), skip_label.clone()),
            _ => Instruction::CondJump(left, skip_label.clone(), right_label.clone()),
        };

        self.push(jump);
        let output = self.fresh_var(Type::Bool);

        self.push(Instruction::SetLabel(right_label));
        let right = self.visit(right)?;
        self.copy(right, output.clone());
        self.push(Instruction::Jump(end_label.clone()));

        self.push(Instruction::SetLabel(skip_label));
        self.push(Instruction::LoadBoolConst(op == BinOp::Or, output.clone()));
        self.push(Instruction::Jump(end_label.clone()));

        self.push(Instruction::SetLabel(end_label));
        Ok(output)
    }

    fn call(
        &mut self,
        name: &str,
        arguments: Vec<Var>,
        typ: Type,
        location: &Location,
    ) -> Generate<Var> {
        let target = self.resolve(name, location)?;
        let output = self.fresh_var(typ);

        self.push(Instruction::Call {
            target,
            arguments,
            output: output.clone(),
        });

        Ok(output)
    }

    fn resolve(&self, name: &str, location: &Location) -> Generate<Var> {
        match self.scope.lookup(name) {
            Some(var) => Ok(var.clone()),
            None => fail(IrError::Undefined(name.into()), location),
        }
    }

    /// Copia entre variables, omitida para `Unit`.
    fn copy(&mut self, source: Var, output: Var) {
        if source.typ() != Type::Unit && source != output {
            self.push(Instruction::Copy(source, output));
        }
    }

    fn fresh_var(&mut self, typ: Type) -> Var {
        if typ == Type::Unit {
            return self.unit.clone();
        }

        let var = Var::new(&format!("x{}", self.next_var), typ);
        self.next_var += 1;

        var
    }

    fn fresh_label(&mut self, hint: &str) -> Label {
        let label = Label::new(&format!("{}{}", hint, self.next_label));
        self.next_label += 1;

        label
    }

    fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }
}

fn fail<T>(error: IrError, location: &Location) -> Generate<T> {
    Err(Located::at(error, location.clone()))
}
