//!
//! shellwire CLI binary
//! --------------------
//! Thin line client for a running shellwire server: connects, optionally
//! answers the login handshake from flags, then forwards stdin lines and
//! prints everything the server sends. Line editing and history belong to
//! the terminal emulator, not to this client.

use std::env;
use std::io::{self, BufRead, Read, Write};
use std::net::TcpStream;

use anyhow::{Context, Result};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--connect HOST:PORT] [--user NAME] [--password SECRET]\n\nFlags:\n  --connect HOST:PORT   Server address (default 127.0.0.1:2222)\n  --user NAME           Answer the login prompt with NAME\n  --password SECRET     Answer the password prompt with SECRET\n  -h, --help            Show this help\n\nWithout --user/--password the prompts are answered interactively like any\nother line. Type 'exit' to leave."
    );
}

fn main() -> Result<()> {
    println!(
        r"     _          _ _          _
 ___| |__   ___| | |_      _(_)_ __ ___
/ __| '_ \ / _ \ | \ \ /\ / / | '__/ _ \
\__ \ | | |  __/ | |\ V  V /| | | |  __/
|___/_| |_|\___|_|_| \_/\_/ |_|_|  \___|
        command line client"
    );

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);

    let mut connect = "127.0.0.1:2222".to_string();
    let mut user: Option<String> = None;
    let mut password: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--connect" => {
                if i + 1 >= args.len() {
                    eprintln!("--connect requires a value");
                    print_usage(&program);
                    std::process::exit(2);
                }
                connect = args[i + 1].clone();
                i += 2;
            }
            "--user" => {
                if i + 1 >= args.len() {
                    eprintln!("--user requires a value");
                    print_usage(&program);
                    std::process::exit(2);
                }
                user = Some(args[i + 1].clone());
                i += 2;
            }
            "--password" => {
                if i + 1 >= args.len() {
                    eprintln!("--password requires a value");
                    print_usage(&program);
                    std::process::exit(2);
                }
                password = Some(args[i + 1].clone());
                i += 2;
            }
            "--help" | "-h" => {
                print_usage(&program);
                return Ok(());
            }
            other => {
                eprintln!("unknown flag: {}", other);
                print_usage(&program);
                std::process::exit(2);
            }
        }
    }

    let stream = TcpStream::connect(&connect)
        .with_context(|| format!("failed to connect to {}", connect))?;
    let mut writer = stream.try_clone().context("failed to clone stream")?;

    // Print everything the server sends as it arrives; prompts have no
    // trailing newline so a line-based reader would sit on them.
    let reader = std::thread::spawn(move || {
        let mut stream = stream;
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let _ = io::stdout().write_all(&buf[..n]);
                    let _ = io::stdout().flush();
                }
            }
        }
        println!("\nconnection closed by server");
    });

    if let Some(u) = user {
        writer.write_all(format!("{}\n", u).as_bytes())?;
    }
    if let Some(p) = password {
        writer.write_all(format!("{}\n", p).as_bytes())?;
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if writer.write_all(format!("{}\n", line).as_bytes()).is_err() {
            break;
        }
    }

    drop(writer);
    let _ = reader.join();
    Ok(())
}
