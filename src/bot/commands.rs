/// Órdenes de texto reconocidas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    Skip,
    Pause,
    Resume,
    Stop,
    Volume(String),
    Leave,
    Queue,
    Ping,
    Help,
}

/// Interpreta un mensaje. Devuelve `None` si no empieza por el prefijo o si
/// la orden no existe. El argumento se conserva tal cual: validarlo es
/// trabajo del motor.
pub fn parse(prefix: &str, content: &str) -> Option<Command> {
    let content = content.trim_start();
    let head = content.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }

    let rest = content[prefix.len()..].trim();
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let command = match name.to_lowercase().as_str() {
        "play" | "p" | "jugar" => Command::Play(args.to_string()),
        "skip" | "s" => Command::Skip,
        "pause" | "pausa" => Command::Pause,
        "resume" | "r" => Command::Resume,
        "stop" | "detener" => Command::Stop,
        "volume" | "vol" | "volumen" => Command::Volume(args.to_string()),
        "leave" | "adios" | "disconnect" => Command::Leave,
        "queue" | "q" => Command::Queue,
        "ping" => Command::Ping,
        "help" | "ayuda" => Command::Help,
        _ => return None,
    };

    Some(command)
}

/// Texto de ayuda con el prefijo configurado.
pub fn help_text(prefix: &str) -> String {
    [
        ("play <song or URL>", "Plays a song or adds it to the queue"),
        ("skip", "Skips the current song"),
        ("pause", "Pauses playback"),
        ("resume", "Resumes playback"),
        ("stop", "Stops playback and clears the queue"),
        ("volume <0-100>", "Sets the volume"),
        ("queue", "Shows the queue"),
        ("leave", "Leaves the voice channel"),
        ("ping", "Checks that the bot is alive"),
    ]
    .iter()
    .fold(String::from("**Commands**\n"), |mut text, (usage, about)| {
        text.push_str(&format!("`{}{}` - {}\n", prefix, usage, about));
        text
    })
}
