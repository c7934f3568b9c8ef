use std::{env, fs, process::ExitCode};

use son::{Interpreter, StdTranscript};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let program_path = if args.len() > 1 { &args[1] } else { "program.json" };
    let image_path = args.get(2);

    let program = match read_json(program_path) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let interpreter = match image_path {
        Some(path) => {
            let image = match read_json(path) {
                Ok(image) => image,
                Err(err) => {
                    eprintln!("error: {err}");
                    return ExitCode::FAILURE;
                }
            };
            Interpreter::from_image(&image, Box::new(StdTranscript))
        }
        None => Interpreter::new(),
    };
    let interpreter = match interpreter {
        Ok(interpreter) => interpreter,
        Err(err) => {
            eprintln!("error loading image: {err}");
            return ExitCode::FAILURE;
        }
    };

    match interpreter.run(&program) {
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn read_json(path: &str) -> Result<serde_json::Value, String> {
    let text = fs::read_to_string(path).map_err(|err| format!("reading {path}: {err}"))?;
    serde_json::from_str(&text).map_err(|err| format!("parsing {path}: {err}"))
}
