use hildon_im::parser::{Command, Message, Trigger};
use hildon_im::x11rb::Client;
use x11rb::connection::Connection;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let (conn, screen_num) = x11rb::connect(None)?;
    let screen = &conn.setup().roots[screen_num];

    let mut client = Client::init(&conn, screen)?;
    println!("IM window: {:#x}", client.im_window());

    client.send_message(&Message::Activate {
        input_window: 0,
        app_window: 0,
        command: Command::Hide,
        trigger: Trigger::Unknown,
    })?;

    Ok(())
}
