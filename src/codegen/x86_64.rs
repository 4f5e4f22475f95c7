use std::{fmt, io::Write};

use super::{emit_label, label_symbol, CodegenError, Intrinsic, Locals};
use crate::ir::{Function, Instruction, Var};

pub fn emit_function<W: Write>(output: &mut W, function: &Function) -> Result<(), CodegenError> {
    let x86_function = X86Function {
        output,
        function,
        locals: Locals::new(&function.body),
    };

    x86_function.write_asm()
}

#[derive(Copy, Clone)]
pub enum Reg {
    Rax,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    R8,
    R9,
}

impl Reg {
    /* La ABI indica que se coloquen los primeros 6 argumentos en los registros %rdi, %rsi, %rdx, %rcx,
     * %r8 y %r9. No se generan llamadas con argumentos en stack.
     */
    const MAX_ARGS: usize = 6;

    fn argument_sequence() -> impl Iterator<Item = Reg> {
        use Reg::*;

        std::iter::successors(Some(Rdi), |last| match last {
            Rdi => Some(Rsi),
            Rsi => Some(Rdx),
            Rdx => Some(Rcx),
            Rcx => Some(R8),
            R8 => Some(R9),
            _ => None,
        })
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Reg::*;

        let name = match self {
            Rax => "rax",
            Rcx => "rcx",
            Rdx => "rdx",
            Rsi => "rsi",
            Rdi => "rdi",
            R8 => "r8",
            R9 => "r9",
        };

        formatter.write_str(name)
    }
}

struct X86Function<'a, W> {
    output: &'a mut W,
    function: &'a Function,
    locals: Locals,
}

impl<W: Write> X86Function<'_, W> {
    fn write_asm(mut self) -> Result<(), CodegenError> {
        // Prólogo, crea un stack frame
        emit!(self.output, "pushq", "%rbp")?;
        emit!(self.output, "movq", "%rsp, %rbp")?;

        // Se reserva memoria para locales
        let stack_used = self.locals.stack_used();
        if stack_used > 0 {
            emit!(self.output, "subq", "${}, %rsp", stack_used)?;
        }

        for var in self.locals.iter() {
            writeln!(self.output, "\t# {} in {}", var, self.locals.get_ref(var)?)?;
        }

        let function = self.function;
        for instruction in &function.body {
            writeln!(self.output)?;
            writeln!(self.output, "\t# {}", instruction)?;
            self.put_instruction(instruction)?;
        }

        // Epílogo, siempre se retorna cero
        writeln!(self.output)?;
        emit!(self.output, "movq", "$0, %rax")?;
        emit!(self.output, "movq", "%rbp, %rsp")?;
        emit!(self.output, "popq", "%rbp")?;
        emit!(self.output, "ret")?;

        Ok(())
    }

    fn put_instruction(&mut self, instruction: &Instruction) -> Result<(), CodegenError> {
        use Instruction::*;

        match instruction {
            SetLabel(label) => emit_label(self.output, self.function, label)?,
            Jump(label) => emit!(self.output, "jmp", "{}", label_symbol(self.function, label))?,

            LoadIntConst(value, output) => {
                let slot = self.locals.get_ref(output)?;
                if i32::try_from(*value).is_ok() {
                    emit!(self.output, "movq", "${}, {}", value, slot)?;
                } else {
                    emit!(self.output, "movabsq", "${}, %rax", value)?;
                    emit!(self.output, "movq", "%rax, {}", slot)?;
                }
            }

            LoadBoolConst(value, output) => {
                let slot = self.locals.get_ref(output)?;
                emit!(self.output, "movq", "${}, {}", *value as u8, slot)?;
            }

            Copy(source, output) => {
                self.var_to_register(source, Reg::Rax)?;
                self.register_to_var(Reg::Rax, output)?;
            }

            CondJump(condition, then, otherwise) => {
                let slot = self.locals.get_ref(condition)?;
                emit!(self.output, "cmpq", "$0, {}", slot)?;
                emit!(self.output, "jne", "{}", label_symbol(self.function, then))?;
                emit!(self.output, "jmp", "{}", label_symbol(self.function, otherwise))?;
            }

            Call {
                target,
                arguments,
                output,
            } => self.call(target, arguments, output)?,
        }

        Ok(())
    }

    fn call(&mut self, target: &Var, arguments: &[Var], output: &Var) -> Result<(), CodegenError> {
        let slots = arguments
            .iter()
            .map(|argument| self.locals.get_ref(argument))
            .collect::<Result<Vec<_>, _>>()?;

        match Intrinsic::from_name(target.name()) {
            Some(intrinsic) if intrinsic.arity() == arguments.len() => {
                intrinsic.emit(self.output, &slots)?;
            }

            Some(_) => {
                return Err(CodegenError::Unsupported(format!(
                    "`{}` called with {} arguments",
                    target,
                    arguments.len()
                )))
            }

            None if arguments.len() > Reg::MAX_ARGS => {
                return Err(CodegenError::TooManyArguments {
                    function: target.name().to_owned(),
                    count: arguments.len(),
                })
            }

            None => {
                for (slot, register) in slots.iter().zip(Reg::argument_sequence()) {
                    emit!(self.output, "movq", "{}, %{}", slot, register)?;
                }

                emit!(self.output, "callq", "{}", target)?;
            }
        }

        self.register_to_var(Reg::Rax, output)
    }

    fn var_to_register(&mut self, var: &Var, register: Reg) -> Result<(), CodegenError> {
        let slot = self.locals.get_ref(var)?;
        emit!(self.output, "movq", "{}, %{}", slot, register)?;

        Ok(())
    }

    fn register_to_var(&mut self, register: Reg, var: &Var) -> Result<(), CodegenError> {
        let slot = self.locals.get_ref(var)?;
        emit!(self.output, "movq", "%{}, {}", register, slot)?;

        Ok(())
    }
}
