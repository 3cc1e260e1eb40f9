//! Command-line parsing.
//!
//! [`Command::parse`] only splits the verb from its arguments. Argument
//! grammars are parsed separately because the session checks sequencing
//! before syntax for most commands.

/// One client command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo(String),
    Ehlo(String),
    Mail(String),
    Rcpt(String),
    Data,
    Bdat(String),
    Rset,
    Noop,
    Quit,
    Help,
    Vrfy,
    Unknown(String),
}

impl Command {
    /// Split a command line (without its terminator) into verb and arguments.
    /// Verbs are case-insensitive.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (verb, args) = match line.split_once(char::is_whitespace) {
            Some((verb, args)) => (verb, args.trim().to_string()),
            None => (line, String::new()),
        };

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Command::Helo(args),
            "EHLO" => Command::Ehlo(args),
            "MAIL" => Command::Mail(args),
            "RCPT" => Command::Rcpt(args),
            "DATA" => Command::Data,
            "BDAT" => Command::Bdat(args),
            "RSET" => Command::Rset,
            "NOOP" => Command::Noop,
            "QUIT" => Command::Quit,
            "HELP" => Command::Help,
            "VRFY" => Command::Vrfy,
            other => Command::Unknown(other.to_string()),
        }
    }

    /// Verb label for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Helo(_) => "HELO",
            Command::Ehlo(_) => "EHLO",
            Command::Mail(_) => "MAIL",
            Command::Rcpt(_) => "RCPT",
            Command::Data => "DATA",
            Command::Bdat(_) => "BDAT",
            Command::Rset => "RSET",
            Command::Noop => "NOOP",
            Command::Quit => "QUIT",
            Command::Help => "HELP",
            Command::Vrfy => "VRFY",
            Command::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Why a command's arguments were rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgError {
    #[error("Syntax error in parameters")]
    MissingPrefix,

    #[error("Empty address")]
    EmptyAddress,

    #[error("Invalid address format")]
    InvalidAddress,

    #[error("Invalid parameter {0}")]
    InvalidParameter(String),

    #[error("Invalid BDAT parameters")]
    InvalidChunk,
}

/// Address and ESMTP parameters from `MAIL FROM:` or `RCPT TO:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathArg {
    pub address: String,
    /// Declared `SIZE=` parameter, if any.
    pub declared_size: Option<usize>,
}

/// Parse `FROM:<addr> [params]` (or `TO:...`) with a case-insensitive prefix.
pub fn parse_path(args: &str, prefix: &str) -> Result<PathArg, ArgError> {
    let head = args.get(..prefix.len()).ok_or(ArgError::MissingPrefix)?;
    if !head.eq_ignore_ascii_case(prefix) {
        return Err(ArgError::MissingPrefix);
    }
    let rest = args[prefix.len()..].trim_start();

    let (path, params) = if rest.starts_with('<') {
        match rest.find('>') {
            Some(end) => (&rest[..=end], &rest[end + 1..]),
            None => (rest, ""),
        }
    } else {
        rest.split_once(char::is_whitespace).unwrap_or((rest, ""))
    };

    let address = path.trim().trim_matches(|c| c == '<' || c == '>').trim();
    if address.is_empty() {
        return Err(ArgError::EmptyAddress);
    }
    if !address.contains('@') {
        return Err(ArgError::InvalidAddress);
    }

    let mut declared_size = None;
    for param in params.split_whitespace() {
        if let Some((key, value)) = param.split_once('=') {
            if key.eq_ignore_ascii_case("SIZE") {
                let size = value
                    .parse()
                    .map_err(|_| ArgError::InvalidParameter(param.to_string()))?;
                declared_size = Some(size);
            }
        }
    }

    Ok(PathArg {
        address: address.to_string(),
        declared_size,
    })
}

/// Arguments of `BDAT <size> [LAST]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkArg {
    pub size: usize,
    pub last: bool,
}

pub fn parse_bdat(args: &str) -> Result<ChunkArg, ArgError> {
    let mut parts = args.split_whitespace();
    let size = parts
        .next()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or(ArgError::InvalidChunk)?;

    let last = match parts.next() {
        None => false,
        Some(flag) if flag.eq_ignore_ascii_case("LAST") => true,
        Some(_) => return Err(ArgError::InvalidChunk),
    };
    if parts.next().is_some() {
        return Err(ArgError::InvalidChunk);
    }

    Ok(ChunkArg { size, last })
}
