use miette::Result;

pub fn run(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    if json {
        println!("{}", serde_json::json!({ "name": "moorhen", "version": version }));
    } else {
        println!("moorhen {version}");
    }
    Ok(())
}
