//! livecode: terminal client for shared code rooms.
//!
//! ```text
//! livecode create          create a room and join it
//! livecode join <room-id>  join an existing room
//! ```
//!
//! Every line typed on stdin is appended to the shared buffer. Lines starting
//! with `:` are commands, see [`HELP`]. Server addresses come from
//! `LIVECODE_WS_URL` / `LIVECODE_API_URL`, log filtering from `RUST_LOG`.

mod view;

use std::process::ExitCode;

use livecode_collab::{ClientConfig, CollabClient, HttpApi, SessionHandle, WsConnector};
use tokio::io::{AsyncBufReadExt, BufReader};

use view::View;

const USAGE: &str = "usage: livecode create | livecode join <room-id>";

const HELP: &str = "\
:code          print the buffer
:clear         empty the buffer
:cursor <n>    move the caret to character offset n
:lang <name>   set the buffer language
:log           print the activity log
:clearlog      clear the activity log
:reconnect     reconnect now
:quit          leave the room";

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn handle_line(session: &SessionHandle, view: &mut View, line: &str) -> Flow {
    let Some(command) = line.strip_prefix(':') else {
        session.append(format!("{line}\n"));
        return Flow::Continue;
    };

    let (name, arg) = command
        .split_once(' ')
        .map_or((command, ""), |(name, arg)| (name, arg.trim()));
    match name {
        "code" => view.print_buffer(&session.snapshot()),
        "clear" => session.edit(String::new(), Some(0)),
        "cursor" => match arg.parse::<usize>() {
            Ok(offset) => session.move_cursor(offset),
            Err(_) => println!("expected a character offset, got {arg:?}"),
        },
        "lang" if !arg.is_empty() => session.set_language(arg),
        "log" => view.print_activity(&session.snapshot()),
        "clearlog" => session.clear_activity(),
        "reconnect" => session.reconnect(),
        "quit" | "q" => return Flow::Quit,
        _ => println!("{HELP}"),
    }
    Flow::Continue
}

async fn start(client: &CollabClient<HttpApi, HttpApi>, args: &[String]) -> Option<SessionHandle> {
    let result = match args {
        [cmd] if cmd == "create" => client.create_room(WsConnector::new()).await,
        [cmd, room_id] if cmd == "join" => client.join_room(room_id, WsConnector::new()).await,
        _ => {
            eprintln!("{USAGE}");
            return None;
        }
    };

    match result {
        Ok(session) => Some(session),
        Err(e) => {
            log::error!("{e}");
            eprintln!("{}", e.user_message());
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = ClientConfig::from_env();
    log::info!("Using room server {} / API {}", config.ws_base_url, config.api_base_url);
    let client = CollabClient::http(config);

    let Some(session) = start(&client, &args).await else {
        return ExitCode::FAILURE;
    };
    println!(
        "Room {} (created {}), you are {}. Type :help for commands.",
        session.session_id(),
        session.created_at(),
        session.user_id()
    );

    let mut snapshots = session.subscribe();
    let mut view = View::default();
    view.render(&snapshots.borrow_and_update().clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if handle_line(&session, &mut view, &line) == Flow::Quit {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::error!("Failed to read stdin: {e}");
                    break;
                }
            },

            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                view.render(&snapshot);
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.leave().await;
    println!("Left the room.");
    ExitCode::SUCCESS
}
