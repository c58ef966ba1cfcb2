//! One-shot command line client: encodes the arguments as a single request
//! frame, waits for the reply and prints it.
//!
//!     client set mykey myvalue
//!     client get mykey
//!
//! The target address defaults to the local server and can be overridden
//! through CRUCIBLE_ADDR.

use byteorder::{ByteOrder, LittleEndian};
use crucible::net::frame::{self, ResCode};
use std::env;
use std::io::Read;
use std::net::TcpStream;
use std::process;

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() {
        eprintln!("usage: client <command> [<arg>...]");
        process::exit(2);
    }

    let address = env::var("CRUCIBLE_ADDR").unwrap_or_else(|_| "127.0.0.1:1234".to_string());
    let mut stream = TcpStream::connect(&address).expect("Error connecting to the server");

    let request: Vec<&[u8]> = args.iter().map(|arg| arg.as_bytes()).collect();
    frame::write_request(&mut stream, &request).expect("Error sending the request");

    let mut header = [0u8; frame::HEADER_SIZE];
    stream.read_exact(&mut header).expect("Error reading the reply header");

    let body_len = LittleEndian::read_u32(&header) as usize;

    if body_len > frame::MAX_MSG {
        eprintln!("reply too long: {}", body_len);
        process::exit(1);
    }

    let mut body = vec![0u8; body_len];
    stream.read_exact(&mut body).expect("Error reading the reply body");

    let (code, payload) = frame::parse_response(&body).expect("Error parsing the reply");

    match code {
        ResCode::Ok => println!("[ok] {}", String::from_utf8_lossy(payload)),
        ResCode::Nx => println!("[nx]"),
        ResCode::Err => {
            eprintln!("[err] {}", String::from_utf8_lossy(payload));
            process::exit(1);
        }
    }
}
