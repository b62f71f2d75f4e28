//! Login command implementation (device-code flow).
//!
//! `cirrus login` starts a device-code login and returns immediately; the
//! user finishes in a browser and runs `cirrus login --check`, which makes
//! exactly one token-exchange attempt. No invocation ever blocks waiting
//! for the user.

use anyhow::Result;

use cirrus_core::auth::LoginProgress;
use cirrus_core::error::Error;

use crate::ui::LoginBox;

use super::LoginArgs;

/// Run the login command.
pub async fn run(args: LoginArgs) -> Result<()> {
    let client = super::build_client()?;

    if args.check {
        return check(&client).await;
    }

    match client.initiate_login().await {
        Ok(state) => {
            println!();
            println!("To sign in, open the page below and enter the code.");
            println!();
            LoginBox::new(&state.user_code, &state.verification_uri).display();
            println!();
            println!("Then run 'cirrus login --check' to finish.");
            Ok(())
        }
        Err(Error::Conflict(_)) => {
            // Restate the pending code rather than minting a second one.
            if let Some(state) = client.pending_login()? {
                println!("A login is already in progress.");
                println!();
                LoginBox::new(&state.user_code, &state.verification_uri).display();
                println!();
                println!("Run 'cirrus login --check' to finish, or 'cirrus logout' to start over.");
                Ok(())
            } else {
                anyhow::bail!("a login is already in progress; run 'cirrus login --check'");
            }
        }
        Err(e) => Err(e.into()),
    }
}

async fn check(client: &cirrus_core::client::Client) -> Result<()> {
    match client.advance_login().await {
        Ok(LoginProgress::Authenticated) => {
            println!("Signed in.");
            Ok(())
        }
        Ok(LoginProgress::Pending(state)) => {
            println!("Still waiting for you to approve the sign-in.");
            println!();
            LoginBox::new(&state.user_code, &state.verification_uri).display();
            println!();
            println!("Run 'cirrus login --check' again once you have approved.");
            Ok(())
        }
        Ok(LoginProgress::Declined) => {
            anyhow::bail!("sign-in was declined; run 'cirrus login' to start over")
        }
        Ok(LoginProgress::Expired) => {
            anyhow::bail!("the sign-in code expired; run 'cirrus login' to start over")
        }
        Err(Error::ReauthRequired(_)) => {
            anyhow::bail!("no login in progress; run 'cirrus login' first")
        }
        Err(e) => Err(e.into()),
    }
}
