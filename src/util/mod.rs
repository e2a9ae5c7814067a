pub mod lamport;
