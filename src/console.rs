//! Line-oriented controller front-end.
//!
//! A reader thread feeds stdin lines through a channel; the main thread
//! pumps the session every tick and runs whatever commands arrived.

use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tracing::{debug, info};

use tracedbg_config::Config;
use tracedbg_net::Endpoint;
use tracedbg_proto::{
    BreakConfiguration, CalledEntryPoint, ContextId, ContextObjectName, EditShaderSource,
    Entrypoint, ForceLinkProgram, GlName, ObjectType, RequestPayload, Resource, StepMode,
};
use tracedbg_session::{
    BreakInfo, HandlerId, ListenerId, ResourceListener, SessionController, SessionError,
    SessionEvents,
};

const HELP: &str = "\
commands:
  continue | c                 resume execution
  step [call|draw|frame]       resume until the next call, draw call or frame
  interrupt                    pause a running process
  break [ids...|clear]         show or replace breakpoints (ids comma or space separated)
  config [flag=on|off ...]     show or change break flags:
                               error, debug-output, compiler, debug-context, debug-context-es
  trace [start end]            next page of call history, or an explicit window
  watch <type> <ctx> <name>    refresh an object at every pause
  unwatch <id>                 stop watching
  edit-shader <ctx> <id> <file|--reset>
  link <ctx> <id>              force a program relink
  connect [endpoint]           reconnect
  terminate                    ask the process to exit
  disconnect                   drop the connection
  quit                         leave";

/// Break flags settable from the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakFlag {
    Error,
    DebugOutput,
    Compiler,
    DebugContext,
    DebugContextEs,
}

impl BreakFlag {
    fn apply(self, cfg: &mut BreakConfiguration, on: bool) {
        match self {
            BreakFlag::Error => cfg.break_on_error = on,
            BreakFlag::DebugOutput => cfg.break_on_debug_output = on,
            BreakFlag::Compiler => cfg.break_on_compiler_error = on,
            BreakFlag::DebugContext => cfg.force_debug_context = on,
            BreakFlag::DebugContextEs => cfg.force_debug_context_es = on,
        }
    }
}

impl FromStr for BreakFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(BreakFlag::Error),
            "debug-output" => Ok(BreakFlag::DebugOutput),
            "compiler" => Ok(BreakFlag::Compiler),
            "debug-context" => Ok(BreakFlag::DebugContext),
            "debug-context-es" => Ok(BreakFlag::DebugContextEs),
            other => Err(format!("unknown break flag: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderEdit {
    Reset,
    File(PathBuf),
}

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Continue,
    Step(StepMode),
    Interrupt,
    ShowBreakpoints,
    SetBreakpoints(Vec<Entrypoint>),
    ShowConfig,
    SetConfig(Vec<(BreakFlag, bool)>),
    /// `None` pages on from the previous trace request.
    Trace(Option<(u64, u64)>),
    Watch {
        object_type: ObjectType,
        name: ContextObjectName,
    },
    Unwatch(u32),
    EditShader {
        context: ContextId,
        shader_id: GlName,
        edit: ShaderEdit,
    },
    Link {
        context: ContextId,
        program_id: GlName,
    },
    Connect(Option<String>),
    Terminate,
    Disconnect,
    Help,
    Quit,
}

/// Parse a decimal or `0x` hexadecimal number.
fn number<T: TryFrom<u64>>(word: &str) -> Result<T, String> {
    let parsed = match word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => word.parse::<u64>().ok(),
    };
    parsed
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| format!("not a number: {word}"))
}

fn on_off(word: &str) -> Result<bool, String> {
    match word {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(format!("expected on or off, got {other}")),
    }
}

fn arg<'a>(args: &[&'a str], index: usize, usage: &str) -> Result<&'a str, String> {
    args.get(index)
        .copied()
        .ok_or_else(|| format!("usage: {usage}"))
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, args)) = words.split_first() else {
            return Err("empty command".to_string());
        };

        match head {
            "continue" | "c" => Ok(ConsoleCommand::Continue),
            "step" | "s" => match args.first() {
                None => Ok(ConsoleCommand::Step(StepMode::Call)),
                Some(mode) => mode.parse().map(ConsoleCommand::Step),
            },
            "interrupt" | "i" => Ok(ConsoleCommand::Interrupt),
            "break" | "b" => match args {
                [] => Ok(ConsoleCommand::ShowBreakpoints),
                ["clear"] => Ok(ConsoleCommand::SetBreakpoints(Vec::new())),
                _ => args
                    .iter()
                    .flat_map(|a| a.split(','))
                    .filter(|a| !a.is_empty())
                    .map(number::<Entrypoint>)
                    .collect::<Result<Vec<_>, _>>()
                    .map(ConsoleCommand::SetBreakpoints),
            },
            "config" => {
                if args.is_empty() {
                    return Ok(ConsoleCommand::ShowConfig);
                }
                args.iter()
                    .map(|a| -> Result<(BreakFlag, bool), String> {
                        let (flag, value) = a
                            .split_once('=')
                            .ok_or_else(|| format!("expected flag=on|off, got {a}"))?;
                        Ok((flag.parse::<BreakFlag>()?, on_off(value)?))
                    })
                    .collect::<Result<Vec<_>, String>>()
                    .map(ConsoleCommand::SetConfig)
            }
            "trace" | "t" => match args {
                [] => Ok(ConsoleCommand::Trace(None)),
                [start, end] => Ok(ConsoleCommand::Trace(Some((number(start)?, number(end)?)))),
                _ => Err("usage: trace [start end]".to_string()),
            },
            "watch" => {
                let usage = "watch <type> <ctx> <name>";
                let object_type: ObjectType = arg(args, 0, usage)?.parse()?;
                let context = number(arg(args, 1, usage)?)?;
                let name = number(arg(args, 2, usage)?)?;
                Ok(ConsoleCommand::Watch {
                    object_type,
                    name: ContextObjectName::new(context, name),
                })
            }
            "unwatch" => Ok(ConsoleCommand::Unwatch(number(arg(args, 0, "unwatch <id>")?)?)),
            "edit-shader" => {
                let usage = "edit-shader <ctx> <id> <file|--reset>";
                let context = number(arg(args, 0, usage)?)?;
                let shader_id = number(arg(args, 1, usage)?)?;
                let edit = match arg(args, 2, usage)? {
                    "--reset" => ShaderEdit::Reset,
                    path => ShaderEdit::File(PathBuf::from(path)),
                };
                Ok(ConsoleCommand::EditShader {
                    context,
                    shader_id,
                    edit,
                })
            }
            "link" => {
                let usage = "link <ctx> <id>";
                Ok(ConsoleCommand::Link {
                    context: number(arg(args, 0, usage)?)?,
                    program_id: number(arg(args, 1, usage)?)?,
                })
            }
            "connect" => Ok(ConsoleCommand::Connect(args.first().map(|s| s.to_string()))),
            "terminate" => Ok(ConsoleCommand::Terminate),
            "disconnect" => Ok(ConsoleCommand::Disconnect),
            "help" | "?" => Ok(ConsoleCommand::Help),
            "quit" | "q" | "exit" => Ok(ConsoleCommand::Quit),
            other => Err(format!("unknown command: {other} (try help)")),
        }
    }
}

/// One line describing a snapshot.
pub fn summarize(resource: &Resource) -> String {
    match resource {
        Resource::Texture(tex) => {
            let levels = tex.faces.first().map_or(0, Vec::len);
            match tex.faces.first().and_then(|f| f.first()) {
                Some(base) => format!(
                    "texture: {} face(s), {} level(s), base {}x{}",
                    tex.faces.len(),
                    levels,
                    base.width,
                    base.height
                ),
                None => "texture: no image data".to_string(),
            }
        }
        Resource::Buffer(buf) => format!("buffer: {} bytes", buf.data.len()),
        Resource::Framebuffer(fb) => format!(
            "framebuffer: {}x{}, {} sample(s)",
            fb.rect.width, fb.rect.height, fb.rect.samples
        ),
        Resource::Renderbuffer(rb) => format!(
            "renderbuffer: {}x{}, {} sample(s)",
            rb.rect.width, rb.rect.height, rb.rect.samples
        ),
        Resource::Fbo(fbo) => {
            let failed = fbo.attachments.iter().filter(|a| a.result.is_err()).count();
            format!(
                "fbo: {} attachment(s), {} unreadable",
                fbo.attachments.len(),
                failed
            )
        }
        Resource::Shader(shader) => {
            let status = if shader.compile_ok {
                "compiled".to_string()
            } else {
                format!("compile failed: {}", shader.compile_status.trim())
            };
            let deleted = if shader.deleted { ", deleted" } else { "" };
            format!(
                "shader: {} line(s), {}{}",
                shader.source.lines().count(),
                status,
                deleted
            )
        }
        Resource::Program(program) => {
            let status = if program.link_ok {
                "linked".to_string()
            } else {
                format!("link failed: {}", program.link_status.trim())
            };
            format!(
                "program: {}, {} shader(s), {} uniform(s)",
                status,
                program.attached_shaders.len(),
                program.uniforms.len()
            )
        }
        Resource::Gpu(gpu) => format!("gpu: {} ({}, {})", gpu.renderer, gpu.vendor, gpu.version),
        Resource::State(state) => format!("state: {} item(s)", state.items.len()),
        Resource::Backtrace(bt) => match bt.frames.first() {
            Some(top) => format!("backtrace: {} frame(s), innermost {}", bt.frames.len(), top),
            None => "backtrace: empty".to_string(),
        },
        Resource::Benchmark(bench) => format!("benchmark: {} bytes", bench.data.len()),
    }
}

/// Prints session notifications to stdout.
struct Printer;

impl SessionEvents for Printer {
    fn on_status(&mut self, status: &str) {
        println!("-- {status}");
    }

    fn on_connected(&mut self, process_name: &str) {
        println!("attached to {process_name}");
    }

    fn on_break(&mut self, info: &BreakInfo) {
        println!(
            "break before {} (history {}, context {:#x})",
            info.entrypoint, info.trace_size, info.current_context
        );
    }

    fn on_trace_chunk(&mut self, start: u64, records: &[CalledEntryPoint]) {
        if records.is_empty() {
            println!("(no calls at offset {start})");
            return;
        }
        let newest = start + records.len() as u64 - 1;
        for (i, record) in records.iter().enumerate() {
            println!("{:>8}  {}", newest - i as u64, record);
        }
    }

    fn on_disconnect(&mut self, reason: &str) {
        println!("disconnected: {reason}");
    }
}

struct WatchPrinter {
    id: u32,
    label: String,
}

impl ResourceListener for WatchPrinter {
    fn on_update(&self, resource: &Resource) {
        println!("watch #{} {}: {}", self.id, self.label, summarize(resource));
    }

    fn on_error(&self, message: &str) {
        println!("watch #{} {}: error: {}", self.id, self.label, message);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

struct Console {
    session: SessionController,
    endpoint: Endpoint,
    page_size: u64,
    trace_cursor: u64,
    cursor_break: Option<u64>,
    handler: HandlerId,
    watches: BTreeMap<u32, ListenerId>,
    next_watch: u32,
}

impl Console {
    fn new(runtime: Handle, config: &Config, endpoint: Endpoint) -> Result<Self, SessionError> {
        let mut session = SessionController::new(runtime, Box::new(Printer));
        session.set_breakpoints(config.breakpoints.iter().copied())?;
        session.configure(config.breaks.to_configuration())?;
        let handler = session.register_handler();
        Ok(Self {
            session,
            endpoint,
            page_size: config.trace.page_size,
            trace_cursor: 0,
            cursor_break: None,
            handler,
            watches: BTreeMap::new(),
            next_watch: 1,
        })
    }

    fn execute(&mut self, command: ConsoleCommand) -> Result<Flow, SessionError> {
        debug!(?command, "console command");
        match command {
            ConsoleCommand::Continue => self.session.continue_()?,
            ConsoleCommand::Step(mode) => self.session.step(mode)?,
            ConsoleCommand::Interrupt => self.session.interrupt()?,
            ConsoleCommand::ShowBreakpoints => {
                let ids: Vec<String> = self.session.breakpoints().iter().map(|e| e.to_string()).collect();
                if ids.is_empty() {
                    println!("no breakpoints");
                } else {
                    println!("breakpoints: {}", ids.join(", "));
                }
            }
            ConsoleCommand::SetBreakpoints(ids) => self.session.set_breakpoints(ids)?,
            ConsoleCommand::ShowConfig => println!("{:?}", self.session.configuration()),
            ConsoleCommand::SetConfig(flags) => {
                let mut cfg = *self.session.configuration();
                for (flag, on) in flags {
                    flag.apply(&mut cfg, on);
                }
                self.session.configure(cfg)?;
            }
            ConsoleCommand::Trace(window) => {
                let (start, end) = window.unwrap_or_else(|| self.next_page());
                self.session.query_trace(start, end)?;
            }
            ConsoleCommand::Watch { object_type, name } => {
                let id = self.next_watch;
                self.next_watch += 1;
                let listener = Rc::new(WatchPrinter {
                    id,
                    label: format!("{object_type} {name}"),
                });
                let listener_id = self.session.subscribe(name, object_type, listener);
                self.watches.insert(id, listener_id);
                println!("watch #{id} refreshes at the next pause");
            }
            ConsoleCommand::Unwatch(id) => match self.watches.remove(&id) {
                Some(listener) => {
                    self.session.unsubscribe(listener);
                }
                None => println!("no watch #{id}"),
            },
            ConsoleCommand::EditShader {
                context,
                shader_id,
                edit,
            } => {
                let request = match edit {
                    ShaderEdit::Reset => EditShaderSource::reset(context, shader_id),
                    ShaderEdit::File(path) => match std::fs::read_to_string(&path) {
                        Ok(source) => EditShaderSource::replace(context, shader_id, source),
                        Err(e) => {
                            println!("cannot read {}: {}", path.display(), e);
                            return Ok(Flow::Continue);
                        }
                    },
                };
                self.send_request(format!("edit shader {shader_id}"), request.into())?;
            }
            ConsoleCommand::Link {
                context,
                program_id,
            } => {
                let request = ForceLinkProgram {
                    context,
                    program_id,
                };
                self.send_request(format!("link program {program_id}"), request.into())?;
            }
            ConsoleCommand::Connect(endpoint) => {
                if let Some(text) = endpoint {
                    match text.parse() {
                        Ok(endpoint) => self.endpoint = endpoint,
                        Err(e) => {
                            println!("{e}");
                            return Ok(Flow::Continue);
                        }
                    }
                }
                self.session.connect(&self.endpoint);
            }
            ConsoleCommand::Terminate => self.session.terminate()?,
            ConsoleCommand::Disconnect => self.session.disconnect(),
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn next_page(&mut self) -> (u64, u64) {
        let current = self.session.last_break().map(|b| b.trace_size);
        if current != self.cursor_break {
            self.cursor_break = current;
            self.trace_cursor = 0;
        }
        let start = self.trace_cursor;
        self.trace_cursor += self.page_size;
        (start, self.trace_cursor)
    }

    fn send_request(&mut self, what: String, payload: RequestPayload) -> Result<(), SessionError> {
        self.session.request(self.handler, payload, move |reply| {
            match reply.into_result() {
                Ok(_) => println!("{what}: ok"),
                Err(e) => println!("{what}: {e}"),
            }
        })?;
        Ok(())
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Attach to `endpoint` and run the console until `quit` or end of input.
pub fn run(config: &Config, endpoint: Endpoint) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    let mut console = Console::new(runtime.handle().clone(), config, endpoint.clone())
        .context("failed to set up session")?;
    info!("attaching to {}", endpoint);
    console.session.connect(&endpoint);

    let lines = spawn_stdin_reader();
    let tick = Duration::from_millis(config.connection.tick_interval_ms);
    loop {
        console.session.pump();
        loop {
            match lines.try_recv() {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => {
                    let flow = match line.parse::<ConsoleCommand>() {
                        Ok(command) => console.execute(command).unwrap_or_else(|e| {
                            println!("error: {e}");
                            Flow::Continue
                        }),
                        Err(e) => {
                            println!("{e}");
                            Flow::Continue
                        }
                    };
                    if flow == Flow::Quit {
                        console.session.disconnect();
                        return Ok(());
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    console.session.disconnect();
                    return Ok(());
                }
            }
        }
        thread::sleep(tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracedbg_proto::resource::{BufferResource, ShaderResource};

    fn parse(line: &str) -> Result<ConsoleCommand, String> {
        line.parse()
    }

    #[test]
    fn parses_execution_commands() {
        assert_eq!(parse("continue"), Ok(ConsoleCommand::Continue));
        assert_eq!(parse("c"), Ok(ConsoleCommand::Continue));
        assert_eq!(parse("step"), Ok(ConsoleCommand::Step(StepMode::Call)));
        assert_eq!(parse("step draw"), Ok(ConsoleCommand::Step(StepMode::DrawCall)));
        assert_eq!(parse("step frame"), Ok(ConsoleCommand::Step(StepMode::Frame)));
        assert_eq!(parse("interrupt"), Ok(ConsoleCommand::Interrupt));
        assert!(parse("step sideways").is_err());
    }

    #[test]
    fn parses_breakpoint_lists() {
        assert_eq!(parse("break"), Ok(ConsoleCommand::ShowBreakpoints));
        assert_eq!(parse("break clear"), Ok(ConsoleCommand::SetBreakpoints(vec![])));
        assert_eq!(
            parse("break 3,7 0x10"),
            Ok(ConsoleCommand::SetBreakpoints(vec![3, 7, 16]))
        );
        assert!(parse("break x").is_err());
    }

    #[test]
    fn parses_config_flags() {
        assert_eq!(parse("config"), Ok(ConsoleCommand::ShowConfig));
        assert_eq!(
            parse("config error=off debug-context=on"),
            Ok(ConsoleCommand::SetConfig(vec![
                (BreakFlag::Error, false),
                (BreakFlag::DebugContext, true)
            ]))
        );
        assert!(parse("config error").is_err());
        assert!(parse("config nonsense=on").is_err());
    }

    #[test]
    fn config_flags_apply_to_wire_configuration() {
        let mut cfg = BreakConfiguration::default();
        BreakFlag::DebugOutput.apply(&mut cfg, false);
        BreakFlag::DebugContextEs.apply(&mut cfg, true);
        assert!(!cfg.break_on_debug_output);
        assert!(cfg.force_debug_context_es);
        assert!(cfg.break_on_error);
    }

    #[test]
    fn parses_trace_windows() {
        assert_eq!(parse("trace"), Ok(ConsoleCommand::Trace(None)));
        assert_eq!(parse("trace 10 20"), Ok(ConsoleCommand::Trace(Some((10, 20)))));
        assert!(parse("trace 10").is_err());
    }

    #[test]
    fn parses_object_commands() {
        assert_eq!(
            parse("watch texture 0x1 5"),
            Ok(ConsoleCommand::Watch {
                object_type: ObjectType::Texture,
                name: ContextObjectName::new(1, 5),
            })
        );
        assert_eq!(parse("unwatch 2"), Ok(ConsoleCommand::Unwatch(2)));
        assert_eq!(
            parse("edit-shader 1 4 --reset"),
            Ok(ConsoleCommand::EditShader {
                context: 1,
                shader_id: 4,
                edit: ShaderEdit::Reset,
            })
        );
        assert_eq!(
            parse("edit-shader 1 4 frag.glsl"),
            Ok(ConsoleCommand::EditShader {
                context: 1,
                shader_id: 4,
                edit: ShaderEdit::File(PathBuf::from("frag.glsl")),
            })
        );
        assert_eq!(
            parse("link 1 3"),
            Ok(ConsoleCommand::Link {
                context: 1,
                program_id: 3
            })
        );
        assert!(parse("watch texture 1").unwrap_err().contains("usage"));
        assert!(parse("watch teapot 1 1").is_err());
    }

    #[test]
    fn parses_session_commands() {
        assert_eq!(parse("terminate"), Ok(ConsoleCommand::Terminate));
        assert_eq!(parse("disconnect"), Ok(ConsoleCommand::Disconnect));
        assert_eq!(parse("connect"), Ok(ConsoleCommand::Connect(None)));
        assert_eq!(
            parse("connect 9000"),
            Ok(ConsoleCommand::Connect(Some("9000".into())))
        );
        assert_eq!(parse("quit"), Ok(ConsoleCommand::Quit));
        assert!(parse("").is_err());
        assert!(parse("launch").unwrap_err().contains("unknown command"));
    }

    #[test]
    fn number_rejects_overflow() {
        assert_eq!(number::<u32>("0xffffffff"), Ok(u32::MAX));
        assert!(number::<u32>("4294967296").is_err());
    }

    #[test]
    fn summaries_name_the_kind() {
        let buffer: Resource = BufferResource { data: vec![0; 64] }.into();
        assert_eq!(summarize(&buffer), "buffer: 64 bytes");

        let shader: Resource = ShaderResource {
            source: "void main() {\n}\n".into(),
            deleted: false,
            compile_ok: false,
            compile_status: "0:1: syntax error\n".into(),
        }
        .into();
        assert_eq!(
            summarize(&shader),
            "shader: 2 line(s), compile failed: 0:1: syntax error"
        );
    }
}
