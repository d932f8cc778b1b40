mod cmd;

fn main() -> anyhow::Result<()> {
    let matches = cmd::make_command().get_matches();
    cmd::execute(&matches)
}
