//! Interactive setup: asks the questions and fills in plain answer structs.
//!
//! Nothing here writes files. The caller turns [`SetupAnswers`] into job
//! requests and runs the same synthesis and merge as the batch command.

use crate::features::Feature;
use crate::job::{
    parse_port, validate_hostname, validate_job_name, validate_remote_host, validate_remote_user,
    RemoteConnection,
};
use crate::settings::Settings;
use crate::utils::{GenError, Result};
use std::io::{BufRead, Write};

/// Line-based question/answer adapter over any reader and writer
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Ask `question`; empty input selects `default`.
    pub fn ask(&mut self, question: &str, default: &str) -> Result<String> {
        writeln!(self.output, "\n{question}")?;
        if !default.is_empty() {
            write!(self.output, "[{default}] ")?;
        }
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(GenError::Usage(format!(
                "Input closed while waiting for an answer to: {question}"
            )));
        }

        let answer = line.trim();
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer.to_string()
        })
    }

    /// Yes/no question. Repeats until the answer is recognised.
    pub fn confirm(&mut self, question: &str, default_yes: bool) -> Result<bool> {
        let hint = if default_yes { "Yn" } else { "yN" };
        loop {
            let answer = self.ask(question, hint)?;
            if answer == hint {
                return Ok(default_yes);
            }
            match answer.to_lowercase().as_str() {
                "y" | "yes" | "1" => return Ok(true),
                "n" | "no" | "0" => return Ok(false),
                _ => writeln!(self.output, "Please answer y or n")?,
            }
        }
    }

    /// Ask until `parse` accepts the answer, printing each rejection.
    pub fn ask_valid<T, F>(&mut self, question: &str, default: &str, parse: F) -> Result<T>
    where
        F: Fn(&str) -> Result<T>,
    {
        loop {
            let answer = self.ask(question, default)?;
            match parse(&answer) {
                Ok(value) => return Ok(value),
                Err(GenError::Validation(message)) => writeln!(self.output, "{message}")?,
                Err(e) => return Err(e),
            }
        }
    }

    /// Ask for an SSH port until a valid one is given.
    pub fn ask_port(&mut self, question: &str, default: u16) -> Result<u16> {
        self.ask_valid(question, &default.to_string(), parse_port)
    }

    /// Writer the questions go to, for messages between questions
    pub fn output(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

/// Answers about one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppAnswers {
    pub name: String,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupAnswers {
    pub remote: RemoteConnection,
    pub local_hostname: String,
    pub authorize_key: bool,
    pub apps: Vec<AppAnswers>,
}

/// Optional per-app questions: feature, question, default answer
const FEATURE_QUESTIONS: [(Feature, &str, bool); 4] = [
    (Feature::Triplestore, "contain a triplestore", true),
    (Feature::Authorization, "contain authorization data", false),
    (Feature::Search, "contain mu-search", false),
    (Feature::FileService, "contain a file service", false),
];

/// Run the interactive questionnaire.
///
/// `config_exists` tells whether a job config already exists; such apps are
/// only kept when the operator agrees to overwrite them.
pub fn gather<R, W, F>(
    prompter: &mut Prompter<R, W>,
    settings: &Settings,
    default_hostname: &str,
    config_exists: F,
) -> Result<SetupAnswers>
where
    R: BufRead,
    W: Write,
    F: Fn(&str) -> bool,
{
    let defaults = &settings.defaults;
    writeln!(prompter.output, "Generating a Borgmatic configuration:")?;

    let host = prompter.ask_valid(
        "Hostname of the backup server (can also be an IP address):",
        &defaults.backup_host,
        |answer| validate_remote_host(answer).map(|()| answer.to_string()),
    )?;
    let port = prompter.ask_port("SSH port of the backup server:", defaults.port)?;
    let user = prompter.ask_valid("Username for the backup server:", &defaults.user, |answer| {
        validate_remote_user(answer).map(|()| answer.to_string())
    })?;
    let local_hostname = prompter.ask_valid(
        "Hostname of the server to backup:",
        default_hostname,
        |answer| validate_hostname(answer).map(|()| answer.to_string()),
    )?;
    let authorize_key = prompter.confirm("Authorize SSH key on backup server?", false)?;

    let names = loop {
        let answer = prompter.ask(
            "Name(s) of app(s) to backup (if multiple, separate them with whitespace):",
            &defaults.apps,
        )?;
        let mut names: Vec<String> = Vec::new();
        for name in answer.split_whitespace() {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        let validation = names.iter().try_for_each(|n| validate_job_name(n));
        match validation {
            Ok(()) if !names.is_empty() => break names,
            Ok(()) => writeln!(prompter.output, "At least one app name is required")?,
            Err(e) => writeln!(prompter.output, "{e}")?,
        }
    };

    let mut apps = Vec::new();
    for name in names {
        if config_exists(&name) {
            let question = format!("A configuration for {name} already exists. Overwrite?");
            if !prompter.confirm(&question, false)? {
                writeln!(prompter.output, "Skipping {name}")?;
                continue;
            }
        }

        let mut features = vec![Feature::Stack];
        for (feature, question, default) in FEATURE_QUESTIONS {
            if prompter.confirm(&format!("Does {name} {question}?"), default)? {
                features.push(feature);
            }
        }
        apps.push(AppAnswers { name, features });
    }

    Ok(SetupAnswers {
        remote: RemoteConnection { user, host, port },
        local_hostname,
        authorize_key,
        apps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_ask_uses_default_on_empty_input() {
        let mut p = prompter("\n");
        assert_eq!(p.ask("Host?", "example.org").unwrap(), "example.org");
        let shown = String::from_utf8(p.into_output()).unwrap();
        assert!(shown.contains("Host?\n[example.org] "));
    }

    #[test]
    fn test_ask_on_closed_input_is_an_error() {
        let mut p = prompter("");
        assert!(matches!(p.ask("Host?", "x"), Err(GenError::Usage(_))));
    }

    #[test]
    fn test_ask_port_reprompts() {
        let mut p = prompter("abc\n0\n65535\n-1\n2222\n");
        assert_eq!(p.ask_port("Port?", 23).unwrap(), 2222);
        let shown = String::from_utf8(p.into_output()).unwrap();
        assert_eq!(shown.matches("Not a valid port:").count(), 4);
    }

    #[test]
    fn test_confirm_defaults_and_answers() {
        let mut p = prompter("\nYn\nmaybe\nyes\nN\n");
        assert!(!p.confirm("Q?", false).unwrap());
        assert!(p.confirm("Q?", true).unwrap());
        assert!(p.confirm("Q?", false).unwrap());
        assert!(!p.confirm("Q?", true).unwrap());
    }

    #[test]
    fn test_gather_full_session() {
        let input = [
            "backup.example.org", // backup host
            "abc",                // invalid port
            "2222",               // port
            "",                   // user (default)
            "srv1",               // local hostname
            "",                   // authorize key (default no)
            "app-a app-b app-a",  // apps, duplicate dropped
            "",                   // app-a triplestore (default yes)
            "n",                  // app-a authorization
            "y",                  // app-a search
            "",                   // app-a file service
            "n",                  // app-b triplestore
            "",                   // app-b authorization
            "",                   // app-b search
            "y",                  // app-b file service
        ]
        .join("\n")
            + "\n";

        let mut p = prompter(&input);
        let answers = gather(&mut p, &Settings::default(), "detected-host", |_| false).unwrap();

        assert_eq!(
            answers.remote,
            RemoteConnection {
                user: "u339567-sub1".to_string(),
                host: "backup.example.org".to_string(),
                port: 2222,
            }
        );
        assert_eq!(answers.local_hostname, "srv1");
        assert!(!answers.authorize_key);
        assert_eq!(
            answers.apps,
            vec![
                AppAnswers {
                    name: "app-a".to_string(),
                    features: vec![Feature::Stack, Feature::Triplestore, Feature::Search],
                },
                AppAnswers {
                    name: "app-b".to_string(),
                    features: vec![Feature::Stack, Feature::FileService],
                },
            ]
        );
    }

    #[test]
    fn test_gather_skips_existing_app_when_declined() {
        let input = ["", "", "", "", "", "app-a", ""].join("\n") + "\n";
        let mut p = prompter(&input);
        let answers = gather(&mut p, &Settings::default(), "h", |name| name == "app-a").unwrap();
        assert!(answers.apps.is_empty());
    }

    #[test]
    fn test_gather_reprompts_for_bad_endpoint() {
        let input = [
            "bad host/x",      // backup host, rejected
            "backup.example.org",
            "+23",             // port, rejected
            "23",
            "us er@",          // user, rejected
            "borg",
            "srv'1 x/y",       // local hostname, rejected
            "srv1",
            "",                // authorize key
            "app-a",
            "",
            "",
            "",
            "",
        ]
        .join("\n")
            + "\n";

        let mut p = prompter(&input);
        let answers = gather(&mut p, &Settings::default(), "detected-host", |_| false).unwrap();
        assert_eq!(
            answers.remote,
            RemoteConnection {
                user: "borg".to_string(),
                host: "backup.example.org".to_string(),
                port: 23,
            }
        );
        assert_eq!(answers.local_hostname, "srv1");

        let shown = String::from_utf8(p.into_output()).unwrap();
        assert_eq!(shown.matches("Hostname of the backup server").count(), 2);
        assert_eq!(shown.matches("Username for the backup server").count(), 2);
        assert_eq!(shown.matches("Hostname of the server to backup").count(), 2);
        assert!(shown.contains("Not a valid backup server host: 'bad host/x'"));
        assert!(shown.contains("Not a valid port: +23"));
        assert!(shown.contains("Invalid server hostname 'srv'1 x/y'"));
    }

    #[test]
    fn test_gather_rejects_bad_app_names() {
        let input = ["", "", "", "", "", "../etc", "app-a", "", "", "", ""].join("\n") + "\n";
        let mut p = prompter(&input);
        let answers = gather(&mut p, &Settings::default(), "h", |_| false).unwrap();
        assert_eq!(answers.apps.len(), 1);
        assert_eq!(answers.local_hostname, "h");
    }
}
