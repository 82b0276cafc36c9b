pub mod cartpole;
