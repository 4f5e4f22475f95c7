//! Construcción de ejecutables.
//!
//! Una vez que se ha emitido código ensamblador, este debe ser
//! ensamblado y enlazado contra `libruntime` para producir un binario
//! ejecutable. Ambas operaciones se delegan a `gcc`.

use std::{
    io::BufWriter,
    path::Path,
    process::{Child, ChildStdin, Command, ExitStatus, Stdio},
};

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Opciones a aplicar durante el enlazado.
    pub struct LinkOptions: u32 {
        /// Remover símbolos de depuración del ejecutable final.
        const STRIP = 0x01;
    }
}

/// Un error de ensamblado o enlazado.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LinkerError {
    /// Ocurrió un evento de error de E/S durante la invocación
    /// de comandos externos.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// El enlazador inició su ejecución, pero falló en enlazar.
    #[error("Linker exited with status code {0:?}")]
    Failed(ExitStatus),
}

/// Comando de enlazado.
const LINKER: &str = "gcc";

/// Instancia del enlazador para un ejecutable definido.
pub struct Linker {
    child: Child,
    stdin: BufWriter<ChildStdin>,
}

impl Linker {
    /// Inicia una instancia del enlazador.
    ///
    /// El enlazador tratará de emitir un ejecutable y escribirlo a
    /// la ruta indicada por `output`. `libruntime.a` se busca en
    /// `library_dir`.
    pub fn spawn<O, L>(output: &O, library_dir: &L, opts: LinkOptions) -> Result<Self, LinkerError>
    where
        O: AsRef<Path> + ?Sized,
        L: AsRef<Path> + ?Sized,
    {
        let mut command = Self::command(output.as_ref(), library_dir.as_ref(), opts);
        tracing::debug!(?command, "spawning linker");

        let mut child = command.spawn()?;
        let stdin = match child.stdin.take() {
            Some(stdin) => BufWriter::new(stdin),
            None => {
                let _ = child.kill();
                return Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "linker stdin is unavailable",
                )
                .into());
            }
        };

        Ok(Linker { child, stdin })
    }

    /// Obtiene la entrada estándar del proceso que espera recibir ensamblador.
    ///
    /// Luego de crear una instancia con [`Linker::spawn()`], se debe escribir código
    /// ensamblador en la forma exacta en que fue emitido por [`crate::codegen`].
    pub fn stdin(&mut self) -> &mut BufWriter<ChildStdin> {
        &mut self.stdin
    }

    /// Indica el fin del flujo de código y finaliza el enlazado.
    pub fn finish(mut self) -> Result<(), LinkerError> {
        drop(self.stdin);

        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(LinkerError::Failed(status))
        }
    }

    fn command(output: &Path, library_dir: &Path, opts: LinkOptions) -> Command {
        // Para ensamblar el código máquina generado por codegen,
        // se hace pipe del mismo al stdin del linker.
        let mut command = Command::new(LINKER);
        command
            .arg("-L")
            .arg(library_dir)
            .arg("-o")
            .arg(output)
            // Se descarta código muerto, se asume entrada en asm y se enlaza
            // contra la biblioteca de soporte libruntime
            .args(&["-Wl,--gc-sections", "-xassembler", "-", "-lruntime"])
            // rustc usa libpthread para hilos, libdl para enlazado
            // lazy en tiempo de ejecución y libm para floats
            .args(&["-pthread", "-ldl", "-lm"])
            .stdin(Stdio::piped());

        if opts.contains(LinkOptions::STRIP) {
            command.arg("-s");
        }

        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arguments(opts: LinkOptions) -> Vec<String> {
        let command = Linker::command(Path::new("a.out"), Path::new("/opt/lib"), opts);
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn links_against_runtime() {
        let args = arguments(LinkOptions::empty());
        assert_eq!(
            args,
            vec![
                "-L",
                "/opt/lib",
                "-o",
                "a.out",
                "-Wl,--gc-sections",
                "-xassembler",
                "-",
                "-lruntime",
                "-pthread",
                "-ldl",
                "-lm",
            ]
        );
    }

    #[test]
    fn strip_option() {
        let args = arguments(LinkOptions::STRIP);
        assert_eq!(args.last().map(String::as_str), Some("-s"));
    }
}
