//! Demo executor answering from a fixed command table.
//!
//! Useful for showcasing the terminal without granting shell access to the
//! host. Unknown commands produce a `command not found` line, never an error.

use async_trait::async_trait;

use super::{to_crlf, CommandExecutor, ExecutorError};

const HELP: &str = "Available commands:
  ls          List files and directories
  ls -l       Long listing
  pwd         Print working directory
  date        Show current date and time
  clear/cls   Clear the screen
  echo [text] Display text
  whoami      Print the current user
  hostname    Print the host name
  uname -a    Print system information
  df -h       Show disk usage
  free -h     Show memory usage
  ps aux      List processes
  top -n 1    Show a process summary
  netstat -tuln  Show listening sockets
  git status  Show working tree status
  npm list --depth=0  List installed packages
  help        Show this help message
";

const LS: &str = "app.log  config.json  docs/  error.log  node_modules/  package.json  src/  test.txt\n";

const LS_LONG: &str = "total 68
drwxr-xr-x 2 user user 4096 Jan 1 12:00 docs
drwxr-xr-x 8 user user 4096 Jan 1 12:00 node_modules
-rw-r--r-- 1 user user  128 Jan 1 12:00 app.log
-rw-r--r-- 1 user user   42 Jan 1 12:00 config.json
-rw-r--r-- 1 user user   96 Jan 1 12:00 error.log
-rw-r--r-- 1 user user  525 Jan 1 12:00 package.json
drwxr-xr-x 4 user user 4096 Jan 1 12:00 src
-rw-r--r-- 1 user user   11 Jan 1 12:00 test.txt
";

const DF: &str = "Filesystem      Size  Used Avail Use% Mounted on
/dev/sda1       100G   25G   75G  25% /
tmpfs            16G     0   16G   0% /dev/shm
/dev/sda2       500G  200G  300G  40% /data
";

const FREE: &str = "              total        used        free      shared  buff/cache   available
Mem:            31Gi       8.0Gi      15Gi       1.0Gi       8.0Gi      21Gi
Swap:          2.0Gi          0B      2.0Gi
";

const PS: &str = "USER         PID %CPU %MEM    VSZ   RSS TTY      STAT START   TIME COMMAND
root           1  0.0  0.0 168004 12416 ?        Ss   Dec25   0:23 /sbin/init
root         557  0.0  0.0  31432  7264 ?        Ss   Dec25   0:00 /usr/sbin/cron
user        1001  0.0  0.1 718776 65536 ?        Sl   10:00   0:02 webshell-daemon
user        1234  0.0  0.0  12000  3600 pts/0    Ss   11:00   0:00 -bash
";

const TOP_SUMMARY: &str = "Tasks: 180 total,   1 running, 179 sleeping,   0 stopped,   0 zombie
%Cpu(s):  5.1 us,  2.3 sy,  0.0 ni, 92.3 id,  0.0 wa,  0.0 hi,  0.3 si,  0.0 st
MiB Mem:  32046.0 total,  15360.0 free,   8192.0 used,   8494.0 buff/cache
MiB Swap:  2048.0 total,   2048.0 free,      0.0 used.  21854.0 avail Mem
";

const NETSTAT: &str = "Active Internet connections (only servers)
Proto Recv-Q Send-Q Local Address           Foreign Address         State
tcp        0      0 0.0.0.0:22             0.0.0.0:*               LISTEN
tcp        0      0 0.0.0.0:8025           0.0.0.0:*               LISTEN
tcp6       0      0 :::80                  :::*                    LISTEN
";

const GIT_STATUS: &str = "On branch main
Your branch is up to date with 'origin/main'.

Changes not staged for commit:
  (use \"git add <file>...\" to update what will be committed)
  (use \"git restore <file>...\" to discard changes in working directory)
        modified:   src/terminal.rs

Untracked files:
  (use \"git add <file>...\" to include in what will be committed)
        docs/new-feature.md

no changes added to commit (use \"git add\" and/or \"git commit -a\")
";

const NPM_LIST: &str = "project@1.0.0 /home/user/project
├── koa@2.14.0
├── vue@3.4.0
├── element-plus@2.4.0
└── xterm@5.3.0
";

/// Clear screen and home the cursor.
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Executor backed by a static table of canned responses.
#[derive(Debug, Clone, Default)]
pub struct CannedExecutor;

impl CannedExecutor {
    /// Creates a new canned executor.
    pub fn new() -> Self {
        Self
    }

    fn respond(command: &str) -> String {
        if let Some(text) = command.strip_prefix("echo ") {
            return format!("{}\r\n", text);
        }

        match command {
            "ls" => to_crlf(LS),
            "ls -l" => to_crlf(LS_LONG),
            "pwd" => "/home/user/project\r\n".to_string(),
            "date" => format!("{}\r\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")),
            "clear" | "cls" => CLEAR_SCREEN.to_string(),
            "echo" => "\r\n".to_string(),
            "whoami" => "baseuser\r\n".to_string(),
            "hostname" => "dev-server\r\n".to_string(),
            "uname -a" => "Linux dev-server 5.15.0-generic #1 SMP x86_64 GNU/Linux\r\n".to_string(),
            "df -h" => to_crlf(DF),
            "free -h" => to_crlf(FREE),
            "ps aux" => to_crlf(PS),
            "top -n 1" => {
                let header = format!(
                    "top - {} up 7 days,  2:15,  1 user,  load average: 0.52, 0.58, 0.59\n",
                    chrono::Local::now().format("%H:%M:%S")
                );
                to_crlf(&(header + TOP_SUMMARY))
            }
            "netstat -tuln" => to_crlf(NETSTAT),
            "git status" => to_crlf(GIT_STATUS),
            "npm list --depth=0" => to_crlf(NPM_LIST),
            "help" => to_crlf(HELP),
            other => format!(
                "{}: command not found\r\nType 'help' for available commands\r\n",
                other
            ),
        }
    }
}

#[async_trait]
impl CommandExecutor for CannedExecutor {
    async fn execute(&self, command: &str) -> Result<String, ExecutorError> {
        Ok(Self::respond(command))
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}
