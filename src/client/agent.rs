//! User-Agent derivation and URL joining.

/// Prefix of every derived User-Agent.
pub const HTTP_AGENT_PREFIX: &str = "webservice/v0";

/// Returned when nothing identifies the process.
pub const UNKNOWN_AGENT: &str = "UNKNOWN";

/// Snapshot of the environment values a User-Agent is derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentEnv {
    pub user_agent: Option<String>,
    pub system: Option<String>,
    pub component: Option<String>,
    pub user: Option<UserInfo>,
}

/// Identity of the OS user running the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub name: Option<String>,
    pub username: Option<String>,
    pub home_dir: Option<String>,
}

impl AgentEnv {
    /// Read the snapshot from the process environment and the account
    /// database.
    pub fn from_process() -> Self {
        Self {
            user_agent: env_var("USER_AGENT"),
            system: env_var("SYSTEM"),
            component: env_var("COMPONENT"),
            user: UserInfo::current(),
        }
    }
}

impl UserInfo {
    /// Account of the current uid from `/etc/passwd`, or the login
    /// environment variables when the account cannot be read.
    pub fn current() -> Option<Self> {
        let from_passwd = current_uid().and_then(|uid| {
            let content = std::fs::read_to_string(PASSWD_PATH).ok()?;
            parse_passwd(&content, uid)
        });
        if from_passwd.is_some() {
            return from_passwd;
        }

        let first = |keys: &[&str]| keys.iter().find_map(|k| env_var(k));
        let user = Self {
            name: None,
            username: first(&["USER", "USERNAME", "LOGNAME"]),
            home_dir: first(&["HOME", "USERPROFILE"]),
        };
        (user.username.is_some() || user.home_dir.is_some()).then_some(user)
    }
}

const PASSWD_PATH: &str = "/etc/passwd";

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Real uid of the process, from the `Uid:` line of `/proc/self/status`.
fn current_uid() -> Option<u32> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|ids| ids.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}

/// Find `uid` in passwd-formatted `content`.
///
/// The display name is the GECOS field up to its first comma.
fn parse_passwd(content: &str, uid: u32) -> Option<UserInfo> {
    content
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() < 7 || fields[2].parse::<u32>().ok()? != uid {
                return None;
            }
            let owned = |s: &str| (!s.is_empty()).then(|| s.to_string());
            let gecos = fields[4].split(',').next().unwrap_or_default();
            Some(UserInfo {
                name: owned(gecos),
                username: owned(fields[0]),
                home_dir: owned(fields[5]),
            })
        })
}

/// Build the User-Agent identifying the process described by `env`.
///
/// Precedence: `USER_AGENT`, then `SYSTEM[/COMPONENT]`, then the user's
/// display name, username or home directory.
pub fn user_agent(env: &AgentEnv) -> String {
    let prefixed = |parts: &[&str]| {
        let mut agent = String::from(HTTP_AGENT_PREFIX);
        for part in parts {
            agent.push('/');
            agent.push_str(part);
        }
        agent
    };
    if let Some(ua) = non_empty(&env.user_agent) {
        return prefixed(&[ua]);
    }

    if let Some(system) = non_empty(&env.system) {
        return match non_empty(&env.component) {
            Some(component) => prefixed(&[system, component]),
            None => prefixed(&[system]),
        };
    }

    let Some(user) = &env.user else {
        return UNKNOWN_AGENT.to_string();
    };
    [&user.name, &user.username, &user.home_dir]
        .into_iter()
        .find_map(non_empty)
        .map(|identity| prefixed(&[identity]))
        .unwrap_or_else(|| UNKNOWN_AGENT.to_string())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Join `base` and `endpoint` with exactly one `/` between them.
pub fn combine_url(base: &str, endpoint: &str) -> String {
    match (base.ends_with('/'), endpoint.starts_with('/')) {
        (true, true) => format!("{}{}", base, &endpoint[1..]),
        (false, false) => format!("{}/{}", base, endpoint),
        _ => format!("{}{}", base, endpoint),
    }
}
